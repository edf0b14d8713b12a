//! Domain-aware text generators: realistic-looking values for
//! columns whose name matches a known domain keyword.

use crate::entropy::EntropyManager;

const FIRST_NAMES: &[&str] = &["Ava", "Liam", "Noah", "Emma", "Maya", "Ethan", "Zoe", "Omar", "Priya", "Lucas"];
const LAST_NAMES: &[&str] = &["Smith", "Garcia", "Chen", "Patel", "Kim", "Nguyen", "Rossi", "Müller", "Johnson", "Kowalski"];
const EMAIL_DOMAINS: &[&str] = &["example.com", "mail.test", "corp.example", "inbox.test"];
const STREET_NAMES: &[&str] = &["Oak St", "Maple Ave", "Elm Dr", "Cedar Ln", "Birch Rd"];
const CITIES: &[&str] = &["Springfield", "Riverton", "Fairview", "Georgetown", "Clinton"];
const STATES: &[&str] = &["CA", "TX", "NY", "WA", "CO", "OH"];
const COUNTRIES: &[&str] = &["US", "CA", "GB", "DE", "FR", "JP"];

/// A recognized column-name domain with a realistic value generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    /// `email`
    Email,
    /// `phone`
    Phone,
    /// `name`
    Name,
    /// `address`
    Address,
    /// `city`
    City,
    /// `state`
    State,
    /// `country`
    Country,
    /// `code`
    Code,
}

impl Domain {
    /// Matches a column name against the known domain keywords
    /// (case-insensitive substring match), preferring the most specific hit.
    pub fn match_column_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        const ORDER: &[(&str, Domain)] = &[
            ("email", Domain::Email),
            ("phone", Domain::Phone),
            ("address", Domain::Address),
            ("city", Domain::City),
            ("state", Domain::State),
            ("country", Domain::Country),
            ("code", Domain::Code),
            ("name", Domain::Name),
        ];
        ORDER.iter().find(|(keyword, _)| lower.contains(keyword)).map(|(_, d)| *d)
    }

    /// Produces one realistic value for this domain.
    pub fn generate(self, entropy: &EntropyManager) -> String {
        match self {
            Domain::Email => {
                let first = pick(entropy, FIRST_NAMES).to_lowercase();
                let last = pick(entropy, LAST_NAMES).to_lowercase();
                let domain = pick(entropy, EMAIL_DOMAINS);
                let n: i64 = entropy.with_rng(|rng| rng.randint(1, 999));
                format!("{}.{}{}@{}", first, last, n, domain)
            }
            Domain::Phone => {
                let area = entropy.with_rng(|rng| rng.randint(200, 999));
                let exchange = entropy.with_rng(|rng| rng.randint(200, 999));
                let line = entropy.with_rng(|rng| rng.randint(0, 9999));
                format!("+1-{:03}-{:03}-{:04}", area, exchange, line)
            }
            Domain::Name => format!("{} {}", pick(entropy, FIRST_NAMES), pick(entropy, LAST_NAMES)),
            Domain::Address => {
                let number = entropy.with_rng(|rng| rng.randint(1, 9999));
                format!("{} {}", number, pick(entropy, STREET_NAMES))
            }
            Domain::City => pick(entropy, CITIES).to_owned(),
            Domain::State => pick(entropy, STATES).to_owned(),
            Domain::Country => pick(entropy, COUNTRIES).to_owned(),
            Domain::Code => {
                let n: i64 = entropy.with_rng(|rng| rng.randint(10000, 99999));
                n.to_string()
            }
        }
    }
}

fn pick<'a>(entropy: &EntropyManager, options: &'a [&'a str]) -> &'a str {
    entropy.with_rng(|rng| *rng.choice(options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::{EntropyConfig, EntropyManager};

    #[test]
    fn matches_known_keywords() {
        assert_eq!(Domain::match_column_name("user_email"), Some(Domain::Email));
        assert_eq!(Domain::match_column_name("home_phone"), Some(Domain::Phone));
        assert_eq!(Domain::match_column_name("widget_sku"), None);
    }

    #[test]
    fn email_looks_like_an_email() {
        let entropy = EntropyManager::new(EntropyConfig {
            base_seed: Some(11),
            ..EntropyConfig::default()
        });
        let email = Domain::Email.generate(&entropy);
        assert!(email.contains('@'));
        assert!(email.contains('.'));
    }
}
