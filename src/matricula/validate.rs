//! OCR text correction and matrícula validation

/// Runs of this many identical digits are rejected
const MAX_REPEAT_RUN: usize = 4;

/// Strings at least this long may not start with `0`
const LEADING_ZERO_MIN_LENGTH: usize = 6;

/// Separators dropped from OCR output
const SEPARATORS: [char; 5] = ['.', ',', '-', '_', '/'];

/// Map a visually confusable character to the digit it usually is
fn confusable_digit(c: char) -> Option<char> {
    let digit = match c {
        'l' | 'I' | 'i' | '|' | '!' => '1',
        'o' | 'O' | 'Q' | 'D' => '0',
        'S' | 's' => '5',
        'Z' | 'z' => '2',
        'G' | 'b' => '6',
        'B' => '8',
        'A' => '4',
        'T' => '7',
        'g' | 'q' => '9',
        _ => return None,
    };
    Some(digit)
}

/// Replace confusable characters with digits and drop whitespace and
/// separators
///
/// Any other character is kept, so the result still fails validation when
/// the read contained real letters.
pub fn correct_common_errors(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !SEPARATORS.contains(c))
        .map(|c| confusable_digit(c).unwrap_or(c))
        .collect()
}

/// Digits only, length within `[min, max]`, and plausible
pub fn is_valid(text: &str, min_length: usize, max_length: usize) -> bool {
    let len = text.chars().count();
    !text.is_empty()
        && text.chars().all(|c| c.is_ascii_digit())
        && (min_length..=max_length).contains(&len)
        && is_plausible(text)
}

/// Reject long runs of one digit and long numbers with a leading zero
pub fn is_plausible(text: &str) -> bool {
    if text.len() >= LEADING_ZERO_MIN_LENGTH && text.starts_with('0') {
        return false;
    }
    let mut run = 0;
    let mut last = None;
    for c in text.chars() {
        if Some(c) == last {
            run += 1;
        } else {
            run = 1;
            last = Some(c);
        }
        if run >= MAX_REPEAT_RUN {
            return false;
        }
    }
    true
}

/// Lowercase and strip Portuguese diacritics
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Whether an OCR word reads as the label, tolerating OCR noise
///
/// Only the alphabetic part of the word is compared, so `MATRÍCULA:` and
/// `Matricula.` both match `matricula`.
pub fn matches_label(word: &str, label: &str, min_similarity: f64) -> bool {
    let letters: String = fold_accents(word).chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }
    strsim::normalized_levenshtein(&letters, &fold_accents(label)) >= min_similarity
}
