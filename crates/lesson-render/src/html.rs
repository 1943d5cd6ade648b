//! Element tree to HTML

use crate::element::Element;

/// Append the HTML for `element` to `out`
pub fn write_html(element: &Element, out: &mut String) {
    match element {
        Element::Text(s) => out.push_str(&html_escape::encode_text(s)),
        Element::Fragment(children) => {
            for child in children {
                write_html(child, out);
            }
        }
        Element::Node { tag, children } => {
            out.push('<');
            out.push_str(tag.name());
            for (name, value) in tag.attributes() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(&value));
                out.push('"');
            }
            if tag.is_void() {
                out.push_str(" />");
                return;
            }
            out.push('>');
            for child in children {
                write_html(child, out);
            }
            out.push_str("</");
            out.push_str(tag.name());
            out.push('>');
        }
    }
}
