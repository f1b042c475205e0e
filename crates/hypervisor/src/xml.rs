//! crates/hypervisor/src/xml.rs
//!
//! Domain configuration XML is treated as an opaque string by this
//! workspace: restore's `--adjust-config` rewrites
//! only `<source file="...">` attributes and whole `<disk>` elements via
//! plain text substitution, without introducing a dependency on a full XML
//! parser.

/// Rewrites the `<source file="...">` attribute of the `<disk>` element
/// whose `<target dev="{disk_target}">` matches, to `new_path`. If no
/// matching disk element is found, `xml` is returned unchanged.
#[must_use]
pub fn rewrite_disk_source(xml: &str, disk_target: &str, new_path: &str) -> String {
    let Some((start, end)) = disk_element_span(xml, disk_target) else {
        return xml.to_string();
    };
    let element = &xml[start..end];
    let rewritten = rewrite_source_attribute(element, new_path);
    format!("{}{}{}", &xml[..start], rewritten, &xml[end..])
}

/// Removes the whole `<disk>` element whose `<target dev="{disk_target}">`
/// matches. If no matching disk element is found, `xml` is returned
/// unchanged.
#[must_use]
pub fn remove_disk(xml: &str, disk_target: &str) -> String {
    let Some((start, end)) = disk_element_span(xml, disk_target) else {
        return xml.to_string();
    };
    format!("{}{}", &xml[..start], &xml[end..])
}

/// Finds the byte span `[start, end)` of the `<disk ...>...</disk>` element
/// whose `target dev` attribute equals `disk_target`.
fn disk_element_span(xml: &str, disk_target: &str) -> Option<(usize, usize)> {
    let target_needle = format!("dev='{disk_target}'");
    let target_needle_dq = format!("dev=\"{disk_target}\"");

    let mut search_from = 0;
    while let Some(rel_start) = xml[search_from..].find("<disk") {
        let elem_start = search_from + rel_start;
        let elem_end = xml[elem_start..].find("</disk>").map(|rel| elem_start + rel + "</disk>".len())?;
        let element = &xml[elem_start..elem_end];
        if element.contains(&target_needle) || element.contains(&target_needle_dq) {
            return Some((elem_start, elem_end));
        }
        search_from = elem_end;
    }
    None
}

/// Replaces or inserts a `<source file="{new_path}"/>` attribute inside one
/// `<disk>...</disk>` element's text.
fn rewrite_source_attribute(element: &str, new_path: &str) -> String {
    let escaped = new_path.replace('&', "&amp;").replace('"', "&quot;");

    if let Some(src_start) = element.find("<source ") {
        if let Some(attr_start) = element[src_start..].find("file=\"") {
            let value_start = src_start + attr_start + "file=\"".len();
            if let Some(rel_end) = element[value_start..].find('"') {
                let value_end = value_start + rel_end;
                return format!("{}{}{}", &element[..value_start], escaped, &element[value_end..]);
            }
        }
        if let Some(attr_start) = element[src_start..].find("file='") {
            let value_start = src_start + attr_start + "file='".len();
            if let Some(rel_end) = element[value_start..].find('\'') {
                let value_end = value_start + rel_end;
                return format!("{}{}{}", &element[..value_start], escaped, &element[value_end..]);
            }
        }
        // `<source .../>` with no `file=` attribute: insert one.
        if let Some(close_rel) = element[src_start..].find('>') {
            let insert_at = src_start + close_rel;
            let tag = &element[src_start..insert_at];
            if tag.trim_end().ends_with('/') {
                let insert_at = src_start + tag.trim_end().len() - 1;
                return format!(
                    "{}file=\"{escaped}\" {}",
                    &element[..insert_at],
                    &element[insert_at..]
                );
            }
            return format!("{} file=\"{escaped}\"{}", &element[..insert_at], &element[insert_at..]);
        }
    }

    element.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN_XML: &str = r#"<domain type='kvm'>
  <devices>
    <disk type='file' device='disk'>
      <source file='/var/lib/libvirt/images/vm1.img'/>
      <target dev='vda' bus='virtio'/>
    </disk>
    <disk type='file' device='disk'>
      <source file='/var/lib/libvirt/images/vm1-data.img'/>
      <target dev='vdb' bus='virtio'/>
    </disk>
  </devices>
</domain>"#;

    #[test]
    fn rewrites_matching_disk_source() {
        let rewritten = rewrite_disk_source(DOMAIN_XML, "vda", "/restore/vm1.img");
        assert!(rewritten.contains("file='/restore/vm1.img'") || rewritten.contains("file=\"/restore/vm1.img\""));
        assert!(rewritten.contains("/var/lib/libvirt/images/vm1-data.img"));
    }

    #[test]
    fn leaves_xml_untouched_for_unknown_disk() {
        let rewritten = rewrite_disk_source(DOMAIN_XML, "vdz", "/restore/vm1.img");
        assert_eq!(rewritten, DOMAIN_XML);
    }

    #[test]
    fn removes_matching_disk_element() {
        let removed = remove_disk(DOMAIN_XML, "vdb");
        assert!(!removed.contains("vdb"));
        assert!(removed.contains("vda"));
    }
}
