//! Claim similarity and grouping.
//!
//! Two claims are equivalent when their normalized texts match exactly or
//! the cosine similarity of their bag-of-content-words vectors clears the
//! configured threshold. Groups are the transitive closure of that
//! relation within a single attempt, computed with a union-find.

use std::collections::{HashMap, HashSet};

/// Stop words excluded from content-word vectors.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "shall", "should", "of", "in", "to", "for", "with",
    "on", "at", "from", "by", "about", "as", "into", "through", "this", "that", "these", "those",
    "it", "its", "and", "but", "or",
];

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Content words of a claim: normalized tokens minus stop words and
/// two-character noise.
pub fn content_words(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Term-frequency vector over content words.
fn term_vector(text: &str) -> HashMap<String, f64> {
    let mut vector: HashMap<String, f64> = HashMap::new();
    for word in content_words(text) {
        *vector.entry(word).or_insert(0.0) += 1.0;
    }
    vector
}

/// Cosine similarity of two term-frequency vectors.
pub fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(word, weight)| b.get(word).map(|other| weight * other))
        .sum();
    let norm_a: f64 = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// The equivalence predicate: exact normalized match or cosine above the
/// threshold.
pub fn is_equivalent(a: &str, b: &str, threshold: f64) -> bool {
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    if !norm_a.is_empty() && norm_a == norm_b {
        return true;
    }
    cosine_similarity(&term_vector(a), &term_vector(b)) >= threshold
}

/// Group claim texts by transitive closure of the equivalence predicate.
/// Returns index groups ordered by first member occurrence.
pub fn group_by_similarity(texts: &[&str], threshold: f64) -> Vec<Vec<usize>> {
    let vectors: Vec<HashMap<String, f64>> = texts.iter().map(|t| term_vector(t)).collect();
    let normalized: Vec<String> = texts.iter().map(|t| normalize(t)).collect();

    let mut uf = UnionFind::new(texts.len());
    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            let exact = !normalized[i].is_empty() && normalized[i] == normalized[j];
            if exact || cosine_similarity(&vectors[i], &vectors[j]) >= threshold {
                uf.union(i, j);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut root_to_group: HashMap<usize, usize> = HashMap::new();
    for i in 0..texts.len() {
        let root = uf.find(i);
        match root_to_group.get(&root) {
            Some(&g) => groups[g].push(i),
            None => {
                root_to_group.insert(root, groups.len());
                groups.push(vec![i]);
            }
        }
    }
    groups
}

/// Maximal digit-bearing tokens, comma-stripped so `8,849` equals `8849`.
/// Decimal points survive, so `1.2` and `2.0` stay distinct.
pub fn numeric_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .filter_map(|token| {
            let cleaned = token
                .trim_matches(|c: char| c == '.' || c == ',')
                .replace(',', "");
            (cleaned.chars().any(|c| c.is_ascii_digit())).then_some(cleaned)
        })
        .collect()
}

/// Shared-content-word count between two texts; used by the relevance
/// filter upstream of verification.
pub fn shared_content_words(a: &str, b: &str) -> usize {
    let words_a: HashSet<String> = content_words(a).into_iter().collect();
    let words_b: HashSet<String> = content_words(b).into_iter().collect();
    words_a.intersection(&words_b).count()
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}
