//! Compound values: strings with embedded numbers and colors.
//!
//! `"10px 20px"` decomposes into the literal tokens `["", "px ", "px"]` and
//! the slots `[10, 20]`. A shadow such as `"0px 2px 4px #000000"` holds a
//! color slot next to its numeric ones. Two compound values can be blended
//! only if their literal tokens and slot kinds are identical; the slots are
//! then blended pairwise and written back into the shared template.
//!
//! Color slots always render as `rgba(r, g, b, a)`, whatever syntax they
//! were written in.

use smallvec::SmallVec;

use super::color::Rgba;
use super::output::format_number;

/// What a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Number,
    Color,
}

/// One animatable token inside a compound value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    Number(f64),
    Color(Rgba),
}

impl Slot {
    pub fn kind(&self) -> SlotKind {
        match self {
            Slot::Number(_) => SlotKind::Number,
            Slot::Color(_) => SlotKind::Color,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Slot::Number(n) => Some(*n),
            Slot::Color(_) => None,
        }
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Slot::Number(n) => out.push_str(&format_number(*n)),
            Slot::Color(c) => out.push_str(&c.to_string()),
        }
    }
}

/// The non-animatable skeleton of a compound value.
///
/// Always holds one more literal than there are slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Template {
    literals: SmallVec<[String; 4]>,
    kinds: SmallVec<[SlotKind; 4]>,
}

impl Template {
    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.kinds.len()
    }

    /// Kind of every slot, in order.
    pub fn kinds(&self) -> &[SlotKind] {
        &self.kinds
    }

    /// Write `slots` into the template.
    pub fn render(&self, slots: &[Slot]) -> String {
        debug_assert_eq!(slots.len(), self.slot_count());

        let literal_len: usize = self.literals.iter().map(String::len).sum();
        let mut out = String::with_capacity(literal_len + slots.len() * 8);
        out.push_str(&self.literals[0]);
        for (slot, literal) in slots.iter().zip(self.literals.iter().skip(1)) {
            slot.render_into(&mut out);
            out.push_str(literal);
        }
        out
    }
}

/// A parsed compound value.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub template: Template,
    pub slots: SmallVec<[Slot; 4]>,
}

impl Compound {
    /// Split `text` into literal tokens and slots.
    pub fn parse(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut literals: SmallVec<[String; 4]> = SmallVec::new();
        let mut slots: SmallVec<[Slot; 4]> = SmallVec::new();
        let mut literal_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            let token = if bytes[i] == b'#' {
                hex_color(text, i)
            } else if bytes[i].is_ascii_alphabetic() || bytes[i] == b'_' {
                // Units and function names may contain digits and hyphens.
                let end = ident_end(bytes, i);
                match color_function(text, i, end) {
                    Some(token) => Some(token),
                    None => {
                        i = end;
                        continue;
                    }
                }
            } else {
                number_len(bytes, i).and_then(|len| {
                    let value = text[i..i + len].parse::<f64>().ok()?;
                    Some((Slot::Number(value), len))
                })
            };

            match token {
                Some((slot, len)) => {
                    literals.push(text[literal_start..i].to_string());
                    slots.push(slot);
                    i += len;
                    literal_start = i;
                }
                None if bytes[i] == b'#' => i = ident_end(bytes, i + 1),
                None => i += 1,
            }
        }
        literals.push(text[literal_start..].to_string());

        let kinds = slots.iter().map(Slot::kind).collect();
        Self {
            template: Template { literals, kinds },
            slots,
        }
    }

    /// Whether the value has at least one slot.
    pub fn is_animatable(&self) -> bool {
        !self.slots.is_empty()
    }

    pub fn render(&self) -> String {
        self.template.render(&self.slots)
    }
}

/// A `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa` token starting at `start`.
fn hex_color(text: &str, start: usize) -> Option<(Slot, usize)> {
    let end = ident_end(text.as_bytes(), start + 1);
    let color = Rgba::parse(&text[start..end])?;
    Some((Slot::Color(color), end - start))
}

/// An `rgb()`, `rgba()`, `hsl()` or `hsla()` token whose name spans
/// `start..name_end`.
fn color_function(text: &str, start: usize, name_end: usize) -> Option<(Slot, usize)> {
    let name = &text[start..name_end];
    let is_color_name = ["rgb", "rgba", "hsl", "hsla"]
        .iter()
        .any(|known| name.eq_ignore_ascii_case(known));
    if !is_color_name || text.as_bytes().get(name_end) != Some(&b'(') {
        return None;
    }

    let close = name_end + text[name_end..].find(')')?;
    let color = Rgba::parse(&text[start..=close])?;
    Some((Slot::Color(color), close + 1 - start))
}

/// Length of the decimal literal starting at `start`, if one starts there.
///
/// Accepts an optional leading `-`, digits with an optional fraction (or a
/// bare fraction like `.5`), and an exponent only when digits follow it, so
/// the `e` in `1em` stays part of the unit.
fn number_len(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    if bytes.get(i) == Some(&b'-') {
        i += 1;
    }

    let int_start = i;
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    let mut has_digits = i > int_start;

    if bytes.get(i) == Some(&b'.') && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
        i += 1;
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        has_digits = true;
    }

    if !has_digits {
        return None;
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        if bytes.get(j).is_some_and(u8::is_ascii_digit) {
            while bytes.get(j).is_some_and(u8::is_ascii_digit) {
                j += 1;
            }
            i = j;
        }
    }

    Some(i - start)
}

/// End of the identifier-like run starting at `start`.
fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while bytes
        .get(i)
        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
    {
        i += 1;
    }
    i
}
