use scraper::{ElementRef, Node};

/// Text content of `elem` where every `<br>` is replaced by `line_break`, trimmed
pub fn text_with_breaks(elem: ElementRef, line_break: &str) -> String {
    let mut text = String::new();
    push_text(&mut text, elem, line_break);
    text.trim().to_string()
}

/// Concatenated text of several elements, `<br>` replaced by `line_break`, trimmed
pub fn joined_text<'a>(elems: impl IntoIterator<Item = ElementRef<'a>>, line_break: &str) -> String {
    let mut text = String::new();
    for elem in elems {
        push_text(&mut text, elem, line_break);
    }
    text.trim().to_string()
}

/// Raw text nodes only, untrimmed
pub fn raw_text<'a>(elems: impl IntoIterator<Item = ElementRef<'a>>) -> String {
    elems.into_iter().flat_map(|elem| elem.text()).collect()
}

fn push_text(buf: &mut String, elem: ElementRef, line_break: &str) {
    for node in elem.descendants() {
        match node.value() {
            Node::Text(text) => buf.push_str(text),
            Node::Element(e) if e.name() == "br" => buf.push_str(line_break),
            _ => (),
        }
    }
}
