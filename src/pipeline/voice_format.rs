//! Text shaping for spoken delivery

/// Emphasis markers removed before speaking
const MARKUP: [&str; 3] = ["**", "*", "_"];

/// Written forms a listener would not hear naturally, applied in order
const SUBSTITUTIONS: [(&str, &str); 8] = [
    ("e.g.", "for example"),
    ("i.e.", "that is"),
    ("etc.", "and so on"),
    ("&", "and"),
    ("@", "at"),
    ("#", "number"),
    ("%", "percent"),
    ("$", "dollars"),
];

/// Sentence breaks that get an audible pause
const PAUSES: [(&str, &str); 3] = [(". ", ". ... "), ("? ", "? ... "), ("! ", "! ... ")];

/// Rewrite a reply so it reads well through a synthesizer
///
/// Strips emphasis markup, expands symbols and abbreviations, and inserts a
/// `...` pause after each sentence that is followed by another.
#[must_use]
pub fn format_for_voice(text: &str) -> String {
    let mut out = text.to_string();
    for marker in MARKUP {
        out = out.replace(marker, "");
    }
    for (from, to) in SUBSTITUTIONS.iter().chain(PAUSES.iter()) {
        out = out.replace(from, to);
    }
    out
}
