//! Keyword smell tests over a startup's text and sectors.

use hotmatch_core::{SmellTests, Startup};

use crate::vocabulary::{contains_term, normalize_label};

const LEAN_INDUSTRIES: &[&str] = &[
    "saas", "software", "mobile", "app", "marketplace", "social", "media", "content",
    "education", "edtech", "consumer", "fintech", "analytics", "productivity",
    "developer tools", "ai", "ml", "automation",
];

const COMPLEX_INDUSTRIES: &[&str] = &[
    "hardware", "biotech", "healthcare", "medical", "pharma", "manufacturing", "automotive",
    "aerospace", "energy", "infrastructure", "defense", "robotics", "semiconductor", "quantum",
];

const PASSION_INDUSTRIES: &[&str] = &[
    "gaming", "social", "dating", "fitness", "health", "wellness", "music", "entertainment",
    "sports", "pet", "kids", "parenting", "food", "travel", "creator", "community", "fan",
    "hobby", "fashion", "beauty",
];

const B2C_MARKERS: &[&str] = &["consumer", "b2c", "app", "social", "marketplace"];

const EMOTIONAL_WORDS: &[&str] = &["love", "passion", "obsess", "addict", "fan", "community", "tribe"];

const PUBLIC_BUILDER_MARKERS: &[&str] = &[
    "developer", "open source", "api", "sdk", "creator", "indie", "maker",
];

const INEVITABLE_TRENDS: &[&str] = &[
    "ai", "ml", "llm", "generative", "climate", "sustainability", "green", "remote", "hybrid",
    "async", "creator economy", "web3", "blockchain", "telemedicine", "mental health",
    "longevity", "space", "quantum", "automation", "robotics", "electric", "battery", "nuclear",
];

const TIMING_WORDS: &[&str] = &["future", "next gen", "revolution", "transform", "disrupt"];

const MASSIVE_MARKETS: &[&str] = &[
    "healthcare", "fintech", "education", "real estate", "insurance", "logistics",
    "supply chain", "hr", "payroll", "accounting", "legal", "construction", "agriculture",
    "energy", "automotive", "retail", "ecommerce", "advertising", "marketing",
];

const PLATFORM_WORDS: &[&str] = &["platform", "marketplace", "network", "ecosystem"];

const SCALE_WORDS: &[&str] = &["scale", "global", "million", "billion", "everyone"];

/// Teams at or below this size count as lean when the industry is ambiguous.
const LEAN_TEAM_SIZE: i32 = 5;

fn any_term(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| contains_term(text, term))
}

/// Evaluate all five smell tests. Pure and deterministic.
pub fn evaluate_smell_tests(startup: &Startup) -> SmellTests {
    let text = normalize_label(&format!(
        "{} {}",
        startup.text_blob(),
        startup.sectors.join(" ")
    ));

    let lean = if any_term(&text, COMPLEX_INDUSTRIES) {
        false
    } else if any_term(&text, LEAN_INDUSTRIES) {
        true
    } else {
        startup.team_size.is_some_and(|n| n > 0 && n <= LEAN_TEAM_SIZE)
    };

    SmellTests {
        lean,
        user_passion: any_term(&text, PASSION_INDUSTRIES)
            || any_term(&text, B2C_MARKERS)
            || any_term(&text, EMOTIONAL_WORDS),
        learning_public: any_term(&text, PUBLIC_BUILDER_MARKERS),
        inevitable: any_term(&text, INEVITABLE_TRENDS) || any_term(&text, TIMING_WORDS),
        massive_if_works: any_term(&text, MASSIVE_MARKETS)
            || any_term(&text, PLATFORM_WORDS)
            || any_term(&text, SCALE_WORDS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn startup(name: &str, tagline: &str, sectors: &[&str]) -> Startup {
        Startup {
            tagline: Some(tagline.to_string()),
            sectors: sectors.iter().map(|s| s.to_string()).collect(),
            ..Startup::new(Uuid::nil(), name)
        }
    }

    #[test]
    fn blank_startup_passes_nothing() {
        let tests = evaluate_smell_tests(&Startup::new(Uuid::nil(), "Blank"));
        assert_eq!(tests.passed(), 0);
    }

    #[test]
    fn complex_industry_is_never_lean() {
        let s = startup("Forge", "Robotics platform for AI factories", &["Robotics", "AI"]);
        let tests = evaluate_smell_tests(&s);
        assert!(!tests.lean);
        assert!(tests.inevitable);
        assert!(tests.massive_if_works);
    }

    #[test]
    fn ambiguous_industry_uses_team_size() {
        let mut s = startup("Quill", "Tools for notaries", &[]);
        assert!(!evaluate_smell_tests(&s).lean);
        s.team_size = Some(3);
        assert!(evaluate_smell_tests(&s).lean);
        s.team_size = Some(12);
        assert!(!evaluate_smell_tests(&s).lean);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let s = startup("Loop", "Open source SDK for creator communities", &["devtools"]);
        let first = evaluate_smell_tests(&s);
        for _ in 0..10 {
            assert_eq!(evaluate_smell_tests(&s), first);
        }
        assert!(first.learning_public);
        assert!(first.user_passion);
    }

    #[test]
    fn short_keywords_need_word_boundaries() {
        // "happy" contains "app" and "chair" contains "hr"; neither should count
        let s = startup("Happy Chair", "seating", &[]);
        let tests = evaluate_smell_tests(&s);
        assert!(!tests.user_passion);
        assert!(!tests.massive_if_works);
    }
}
