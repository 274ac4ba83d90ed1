//! Plate text normalization and validity scoring.
//!
//! Both plate grammars are compile-time constants; nothing here allocates
//! beyond the returned strings.

/// The 36 characters a plate may contain.  Also passed to OCR engines.
pub const ALLOWLIST: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// ── Grammars ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Letter,
    Digit,
}

impl Slot {
    fn accepts(self, c: char) -> bool {
        match self {
            Slot::Letter => c.is_ascii_uppercase(),
            Slot::Digit => c.is_ascii_digit(),
        }
    }
}

/// A fixed-length plate layout, one slot per character.
#[derive(Debug, Clone, Copy)]
pub struct PlateGrammar {
    slots: &'static [Slot],
}

impl PlateGrammar {
    pub fn matches(&self, s: &str) -> bool {
        s.chars().count() == self.slots.len()
            && s.chars().zip(self.slots).all(|(c, slot)| slot.accepts(c))
    }
}

use Slot::{Digit as D, Letter as L};

/// Three letters and four digits, e.g. `ABC1234`.
pub const PATTERN_A: PlateGrammar = PlateGrammar {
    slots: &[L, L, L, D, D, D, D],
};

/// Three letters, digit, letter, two digits, e.g. `ABC1D23`.
pub const PATTERN_B: PlateGrammar = PlateGrammar {
    slots: &[L, L, L, D, L, D, D],
};

pub const GRAMMARS: [PlateGrammar; 2] = [PATTERN_A, PATTERN_B];

/// `true` when `s` fits either plate grammar exactly.
pub fn matches_grammar(s: &str) -> bool {
    GRAMMARS.iter().any(|g| g.matches(s))
}

// ── Normalization ─────────────────────────────────────────────────────────────

/// Which substitution table produced a candidate's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// Stripped and uppercased only.
    None,
    /// Letter-leaning table (0→O, 1→I, 5→S, 8→B, 2→Z).
    DigitToLetter,
    /// Digit-leaning table (O→0, I/L→1, S→5, B→8, Z→2).
    LetterToDigit,
}

/// One normalized OCR hypothesis, scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateCandidate {
    pub text: String,
    pub normalization_applied: Normalization,
    pub validity_score: i32,
}

fn lean_digits(c: char) -> char {
    match c {
        'O' => '0',
        'I' | 'L' => '1',
        'S' => '5',
        'B' => '8',
        'Z' => '2',
        _ => c,
    }
}

fn lean_letters(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '5' => 'S',
        '8' => 'B',
        '2' => 'Z',
        _ => c,
    }
}

/// Drop everything but ASCII letters/digits and uppercase the rest.
pub fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Normalize and report which table (if any) made the text fit a grammar.
pub fn normalize_candidate(raw: &str) -> PlateCandidate {
    let stripped = strip_separators(raw);

    let digits: String = stripped.chars().map(lean_digits).collect();
    let (text, normalization_applied) = if matches_grammar(&digits) {
        (digits, Normalization::LetterToDigit)
    } else {
        let letters: String = stripped.chars().map(lean_letters).collect();
        if matches_grammar(&letters) {
            (letters, Normalization::DigitToLetter)
        } else {
            (stripped, Normalization::None)
        }
    };

    let validity_score = validity_score(&text);
    PlateCandidate {
        text,
        normalization_applied,
        validity_score,
    }
}

/// Canonical plate string for raw OCR output.  Never fails; `""` stays `""`.
pub fn normalize(raw: &str) -> String {
    normalize_candidate(raw).text
}

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Heuristic plate quality: +10 for a grammar match, +2 for length 7,
/// −1 per character outside [`ALLOWLIST`].
pub fn validity_score(s: &str) -> i32 {
    let s = s.trim().to_uppercase();
    let mut score = 0;
    if matches_grammar(&s) {
        score += 10;
    }
    if s.chars().count() == 7 {
        score += 2;
    }
    score -= s.chars().filter(|c| !ALLOWLIST.contains(*c)).count() as i32;
    score
}
