//! Display names and secret codes for new wallets

use rand::Rng;
use walletforge_ledger::model::SECRET_CODE_LEN;
use walletforge_core_types::UnitId;

/// Credentials handed to the wallet creation flow for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSeed {
    pub display_name: String,
    pub secret_code: String,
}

/// Source of per-unit credentials. Key material is generated by the app itself.
pub trait AccountGenerator: Send + Sync {
    fn generate(&self, unit: UnitId) -> AccountSeed;
}

/// `<prefix> <id>` names and uniformly random numeric codes.
#[derive(Debug, Clone)]
pub struct RandomAccountGenerator {
    name_prefix: String,
}

impl Default for RandomAccountGenerator {
    fn default() -> Self {
        Self::new("Wallet")
    }
}

impl RandomAccountGenerator {
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
        }
    }
}

impl AccountGenerator for RandomAccountGenerator {
    fn generate(&self, unit: UnitId) -> AccountSeed {
        let mut rng = rand::thread_rng();
        let secret_code = (0..SECRET_CODE_LEN)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        AccountSeed {
            display_name: format!("{} {}", self.name_prefix, unit),
            secret_code,
        }
    }
}

/// Same seed for every unit.
#[derive(Debug, Clone)]
pub struct FixedAccountGenerator(pub AccountSeed);

impl AccountGenerator for FixedAccountGenerator {
    fn generate(&self, unit: UnitId) -> AccountSeed {
        AccountSeed {
            display_name: format!("{} {}", self.0.display_name, unit),
            secret_code: self.0.secret_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        let generator = RandomAccountGenerator::default();
        for id in 1..50 {
            let seed = generator.generate(UnitId(id));
            assert_eq!(seed.secret_code.len(), SECRET_CODE_LEN);
            assert!(seed.secret_code.bytes().all(|b| b.is_ascii_digit()));
            assert_eq!(seed.display_name, format!("Wallet {id}"));
        }
    }
}
