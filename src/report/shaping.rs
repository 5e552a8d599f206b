//! Right-to-left text preparation for PDF output.
//!
//! printpdf maps each `char` straight to a glyph through the font's cmap and
//! writes glyphs left to right, with no shaping. Arabic letters are therefore
//! replaced by their contextual presentation forms (Unicode block FE70–FEFF,
//! lam-alef ligatures included) and each line is then reordered into visual
//! order with the Unicode bidi algorithm.

use unicode_bidi::{BidiInfo, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joining {
    /// Joins on the right side only (alef, dal, reh, waw...).
    Right,
    /// Joins on both sides.
    Dual,
}

/// Presentation forms: isolated, final, initial, medial. Right-joining
/// letters have no initial/medial forms.
struct Forms {
    joining: Joining,
    isolated: char,
    final_: char,
    initial: char,
    medial: char,
}

const fn right(isolated: u32) -> (Joining, u32) {
    (Joining::Right, isolated)
}

const fn dual(isolated: u32) -> (Joining, u32) {
    (Joining::Dual, isolated)
}

/// Indexed by `letter - 0x0621`; `None` for code points without forms.
const LETTERS: [Option<(Joining, u32)>; 42] = [
    None, // 0621 hamza, non-joining
    Some(right(0xFE81)), // 0622 alef madda
    Some(right(0xFE83)), // 0623 alef hamza above
    Some(right(0xFE85)), // 0624 waw hamza
    Some(right(0xFE87)), // 0625 alef hamza below
    Some(dual(0xFE89)), // 0626 yeh hamza
    Some(right(0xFE8D)), // 0627 alef
    Some(dual(0xFE8F)), // 0628 beh
    Some(right(0xFE93)), // 0629 teh marbuta
    Some(dual(0xFE95)), // 062A teh
    Some(dual(0xFE99)), // 062B theh
    Some(dual(0xFE9D)), // 062C jeem
    Some(dual(0xFEA1)), // 062D hah
    Some(dual(0xFEA5)), // 062E khah
    Some(right(0xFEA9)), // 062F dal
    Some(right(0xFEAB)), // 0630 thal
    Some(right(0xFEAD)), // 0631 reh
    Some(right(0xFEAF)), // 0632 zain
    Some(dual(0xFEB1)), // 0633 seen
    Some(dual(0xFEB5)), // 0634 sheen
    Some(dual(0xFEB9)), // 0635 sad
    Some(dual(0xFEBD)), // 0636 dad
    Some(dual(0xFEC1)), // 0637 tah
    Some(dual(0xFEC5)), // 0638 zah
    Some(dual(0xFEC9)), // 0639 ain
    Some(dual(0xFECD)), // 063A ghain
    None, // 063B
    None, // 063C
    None, // 063D
    None, // 063E
    None, // 063F
    None, // 0640 tatweel, handled as join-causing
    Some(dual(0xFED1)), // 0641 feh
    Some(dual(0xFED5)), // 0642 qaf
    Some(dual(0xFED9)), // 0643 kaf
    Some(dual(0xFEDD)), // 0644 lam
    Some(dual(0xFEE1)), // 0645 meem
    Some(dual(0xFEE5)), // 0646 noon
    Some(dual(0xFEE9)), // 0647 heh
    Some(right(0xFEED)), // 0648 waw
    Some(right(0xFEEF)), // 0649 alef maksura
    Some(dual(0xFEF1)), // 064A yeh
];

const TATWEEL: char = '\u{0640}';
const LAM: char = '\u{0644}';

fn forms(c: char) -> Option<Forms> {
    let index = (c as u32).checked_sub(0x0621)? as usize;
    let (joining, base) = (*LETTERS.get(index)?)?;
    let at = |offset: u32| char::from_u32(base + offset).unwrap_or(c);
    Some(match joining {
        Joining::Right => Forms {
            joining,
            isolated: at(0),
            final_: at(1),
            initial: at(0),
            medial: at(1),
        },
        Joining::Dual => Forms {
            joining,
            isolated: at(0),
            final_: at(1),
            initial: at(2),
            medial: at(3),
        },
    })
}

/// Harakat and other marks are skipped when looking for neighbours.
fn is_transparent(c: char) -> bool {
    matches!(c, '\u{064B}'..='\u{065F}' | '\u{0670}' | '\u{06D6}'..='\u{06ED}')
}

fn joins_forward(c: char) -> bool {
    c == TATWEEL || forms(c).is_some_and(|f| f.joining == Joining::Dual)
}

fn joins_backward(c: char) -> bool {
    c == TATWEEL || forms(c).is_some()
}

/// Lam-alef ligature, (isolated, final), for the alef variant `c`.
fn lam_alef(c: char) -> Option<(char, char)> {
    match c {
        '\u{0622}' => Some(('\u{FEF5}', '\u{FEF6}')),
        '\u{0623}' => Some(('\u{FEF7}', '\u{FEF8}')),
        '\u{0625}' => Some(('\u{FEF9}', '\u{FEFA}')),
        '\u{0627}' => Some(('\u{FEFB}', '\u{FEFC}')),
        _ => None,
    }
}

/// Replace Arabic letters with contextual presentation forms. Logical order is kept.
pub fn shape_arabic(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let neighbour = |from: usize, forward: bool| -> Option<char> {
        if forward {
            chars[from + 1..].iter().copied().find(|c| !is_transparent(*c))
        } else {
            chars[..from].iter().rev().copied().find(|c| !is_transparent(*c))
        }
    };

    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let Some(f) = forms(c) else {
            out.push(c);
            i += 1;
            continue;
        };

        let joined_before = neighbour(i, false).is_some_and(joins_forward);

        if c == LAM {
            if let Some((isolated, final_)) = chars.get(i + 1).copied().and_then(lam_alef) {
                out.push(if joined_before { final_ } else { isolated });
                i += 2;
                continue;
            }
        }

        let joined_after = f.joining == Joining::Dual && neighbour(i, true).is_some_and(joins_backward);
        out.push(match (joined_before, joined_after) {
            (true, true) => f.medial,
            (true, false) => f.final_,
            (false, true) => f.initial,
            (false, false) => f.isolated,
        });
        i += 1;
    }
    out
}

/// One line of right-to-left text, shaped and in visual (left to right) order.
pub fn visual_rtl(line: &str) -> String {
    let shaped = shape_arabic(line);
    let info = BidiInfo::new(&shaped, Some(Level::rtl()));
    info.paragraphs
        .iter()
        .map(|para| info.reorder_line(para, para.range.clone()).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_take_contextual_forms() {
        // seen (initial) + lam-alef (final) + meem (isolated, alef does not join forward)
        assert_eq!(shape_arabic("سلام"), "\u{FEB3}\u{FEFC}\u{FEE1}");
        // beh: initial, medial, final
        assert_eq!(shape_arabic("ببب"), "\u{FE91}\u{FE92}\u{FE90}");
    }

    #[test]
    fn lone_lam_alef_is_isolated_ligature() {
        assert_eq!(shape_arabic("لا"), "\u{FEFB}");
    }

    #[test]
    fn marks_do_not_break_joining() {
        // beh + fatha + teh: beh stays initial through the mark
        let shaped: Vec<char> = shape_arabic("بَت").chars().collect();
        assert_eq!(shaped, vec!['\u{FE91}', '\u{064E}', '\u{FE96}']);
    }

    #[test]
    fn latin_and_digits_untouched() {
        assert_eq!(shape_arabic("Jean 64%"), "Jean 64%");
    }

    #[test]
    fn arabic_is_reversed_for_display() {
        assert_eq!(visual_rtl("سلام"), "\u{FEE1}\u{FEFC}\u{FEB3}");
    }

    #[test]
    fn numbers_keep_reading_order_in_rtl_line() {
        let visual = visual_rtl("العمر 64");
        assert!(visual.starts_with("64 "), "{visual:?}");
        let latin = visual_rtl("Dr Benali");
        assert_eq!(latin, "Dr Benali");
    }

    #[test]
    fn empty_line_stays_empty() {
        assert_eq!(visual_rtl(""), "");
    }
}
