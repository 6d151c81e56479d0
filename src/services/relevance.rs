use std::collections::HashSet;

use crate::models::Faq;
use crate::services::nlu;

const ACCEPT_SCORE: f64 = 3.0;
const ACCEPT_QUESTION_SIM: f64 = 0.35;

/// Normalized similarity ratio in `[0, 1]`: `2·M / (len_a + len_b)`
/// where `M` is the total size of the Ratcliff/Obershelp matching
/// blocks of the accent-folded strings (longest common substring,
/// recursing on both sides).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = nlu::normalize(a).chars().collect();
    let b: Vec<char> = nlu::normalize(b).chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    2.0 * matching_chars(&a, &b) as f64 / (a.len() + b.len()) as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // Longest common substring, single-row DP
    let mut row = vec![0usize; b.len() + 1];
    let (mut best_len, mut best_a, mut best_b) = (0usize, 0usize, 0usize);
    for (i, ca) in a.iter().enumerate() {
        let mut diag = 0;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diag + 1 } else { 0 };
            diag = above;
            if row[j + 1] > best_len {
                best_len = row[j + 1];
                best_a = i + 1 - best_len;
                best_b = j + 1 - best_len;
            }
        }
    }

    if best_len == 0 {
        return 0;
    }

    best_len
        + matching_chars(&a[..best_a], &b[..best_b])
        + matching_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}

fn keyword_set(text: &str) -> HashSet<String> {
    nlu::tokens(text).into_iter().filter(|t| t.len() > 2).collect()
}

fn score(query_words: &HashSet<String>, query: &str, faq: &Faq) -> f64 {
    let question_words = keyword_set(&faq.question);
    let answer_words = keyword_set(&faq.answer);

    let question_overlap = query_words.intersection(&question_words).count() as f64;
    let answer_overlap = query_words.intersection(&answer_words).count() as f64;
    let overlap = 2.0 * question_overlap + answer_overlap;

    let fuzzy = similarity(query, &faq.question).max(similarity(query, &faq.answer));

    overlap + 3.0 * fuzzy
}

/// Best-scoring active FAQ for a free-text query, or `None` when nothing
/// clears the acceptance thresholds. Strictly-greater comparison: the
/// first FAQ in listing order wins ties.
pub fn best_faq_match<'a>(query: &str, faqs: &'a [Faq]) -> Option<&'a Faq> {
    let query_words = keyword_set(query);
    // Nothing but short words: character coincidence alone never matches
    if query_words.is_empty() {
        return None;
    }

    let mut best: Option<(&Faq, f64)> = None;
    for faq in faqs.iter().filter(|f| f.is_active) {
        let s = score(&query_words, query, faq);
        if best.map(|(_, b)| s > b).unwrap_or(true) {
            best = Some((faq, s));
        }
    }

    let (faq, total) = best?;
    if total >= ACCEPT_SCORE || similarity(query, &faq.question) >= ACCEPT_QUESTION_SIM {
        Some(faq)
    } else {
        None
    }
}
