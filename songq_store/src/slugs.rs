//! Short human readable song identifiers.
//!
//! Words are drawn from an embedded list with a Zipf distribution, so the
//! words at the front of the list (the short ones) come up far more often.
//! Collisions are resolved by the queue against its slug index.
use std::sync::OnceLock;

use rand::{rngs::StdRng, Rng, SeedableRng};

const ZIPF_SKEW: f64 = 1.1;
const ZIPF_OFFSET: f64 = 36.5;

static WORDS: OnceLock<Vec<String>> = OnceLock::new();

fn words() -> &'static [String] {
    WORDS.get_or_init(|| {
        let words: Vec<String> =
            serde_json::from_str(include_str!("slugs.json")).expect("embedded slug list is not valid JSON");
        assert!(!words.is_empty(), "embedded slug list is empty");
        words
    })
}

pub struct SlugGenerator {
    words: &'static [String],
    zipf: Zipf,
    rng: StdRng,
}

impl SlugGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic generator, the same seed always yields the same words.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::with_rng(StdRng::from_seed(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let words = words();
        let imax = (words.len() - 1) as u64;
        Self {
            words,
            zipf: Zipf::new(ZIPF_SKEW, ZIPF_OFFSET, imax),
            rng,
        }
    }

    /// Draws a candidate slug. It may already be in use.
    pub fn candidate(&mut self) -> &'static str {
        let index = self.zipf.sample(&mut self.rng);
        let words = self.words;
        words[usize::try_from(index).unwrap_or(0).min(words.len() - 1)].as_str()
    }
}

impl Default for SlugGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric dedupe suffix of `slug` when it is `base` followed by `-<digits>`.
#[must_use]
pub fn dedupe_number(slug: &str, base: &str) -> Option<u64> {
    let digits = slug.strip_prefix(base)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Zipf distribution over `[0, imax]` where P(k) is proportional to `(v + k)^(-s)`,
/// sampled by rejection-inversion (Hörmann & Derflinger).
struct Zipf {
    imax: f64,
    v: f64,
    q: f64,
    s: f64,
    one_minus_q: f64,
    one_minus_q_inv: f64,
    hxm: f64,
    hx0_minus_hxm: f64,
}

impl Zipf {
    fn new(s: f64, v: f64, imax: u64) -> Self {
        debug_assert!(s > 1.0 && v >= 1.0);
        let mut zipf = Self {
            imax: imax as f64,
            v,
            q: s,
            s: 0.0,
            one_minus_q: 1.0 - s,
            one_minus_q_inv: 1.0 / (1.0 - s),
            hxm: 0.0,
            hx0_minus_hxm: 0.0,
        };
        zipf.hxm = zipf.h(zipf.imax + 0.5);
        zipf.hx0_minus_hxm = zipf.h(0.5) - (zipf.v.ln() * -zipf.q).exp() - zipf.hxm;
        zipf.s = 1.0 - zipf.hinv(zipf.h(1.5) - (-zipf.q * (zipf.v + 1.0).ln()).exp());
        zipf
    }

    fn h(&self, x: f64) -> f64 {
        (self.one_minus_q * (self.v + x).ln()).exp() * self.one_minus_q_inv
    }

    fn hinv(&self, x: f64) -> f64 {
        (self.one_minus_q_inv * (self.one_minus_q * x).ln()).exp() - self.v
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        loop {
            let r: f64 = rng.gen();
            let ur = self.hxm + r * self.hx0_minus_hxm;
            let x = self.hinv(ur);
            let k = (x + 0.5).floor();
            if k - x <= self.s || ur >= self.h(k + 0.5) - (-(k + self.v).ln() * self.q).exp() {
                return k.clamp(0.0, self.imax) as u64;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::{dedupe_number, words, SlugGenerator};

    #[test]
    fn same_seed_draws_same_words() {
        let mut a = SlugGenerator::from_seed([7; 32]);
        let mut b = SlugGenerator::from_seed([7; 32]);
        let drawn_a: Vec<&str> = (0..50).map(|_| a.candidate()).collect();
        let drawn_b: Vec<&str> = (0..50).map(|_| b.candidate()).collect();
        assert_eq!(drawn_a, drawn_b);
    }

    #[test]
    fn should_only_draw_listed_words() {
        let mut generator = SlugGenerator::from_seed([1; 32]);
        for _ in 0..1000 {
            let slug = generator.candidate();
            assert!(words().iter().any(|w| w == slug), "{slug} not in list");
        }
    }

    #[test]
    fn front_of_list_is_drawn_more_often() {
        let mut generator = SlugGenerator::from_seed([0; 32]);
        let words = words();
        let half = words.len() / 2;
        let mut front = 0;
        let mut back = 0;
        for _ in 0..10_000 {
            let slug = generator.candidate();
            let index = words.iter().position(|w| w == slug).unwrap();
            if index < half {
                front += 1;
            } else {
                back += 1;
            }
        }
        assert!(front > back, "front {front} back {back}");
    }

    #[test]
    fn word_list_is_unique_and_suffix_free() {
        let words = words();
        let mut sorted = words.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), words.len());
        assert!(words.iter().all(|w| !w.contains('-') && !w.is_empty()));
    }

    #[test]
    fn should_parse_only_numeric_suffixes_of_the_same_base() {
        assert_eq!(dedupe_number("neko-3", "neko"), Some(3));
        assert_eq!(dedupe_number("neko-12", "neko"), Some(12));
        assert_eq!(dedupe_number("neko", "neko"), None);
        assert_eq!(dedupe_number("neko-", "neko"), None);
        assert_eq!(dedupe_number("neko-x1", "neko"), None);
        assert_eq!(dedupe_number("nekomata-2", "neko"), None);
        assert_eq!(dedupe_number("ne-2", "neko"), None);
    }
}
