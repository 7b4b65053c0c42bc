use crate::models::subscriber::Subscriber;

/// Decides whether a new subscriber gets the lifetime plan instead of the
/// free default. Kept behind a trait so tests can force either answer.
pub trait EligibilityCheck: Send + Sync {
    fn qualifies_for_lifetime_grant(&self, subscriber: &Subscriber) -> bool;
}

/// Grants lifetime access to addresses under configured staff domains.
pub struct StaffDomainEligibility {
    domains: Vec<String>,
}

impl StaffDomainEligibility {
    pub fn new(domains: Vec<String>) -> Self {
        let domains = domains
            .into_iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    /// Comma-separated domains from `STAFF_EMAIL_DOMAINS`; empty or unset
    /// means nobody qualifies.
    pub fn from_env() -> Self {
        let raw = std::env::var("STAFF_EMAIL_DOMAINS").unwrap_or_default();
        Self::new(raw.split(',').map(str::to_string).collect())
    }
}

impl EligibilityCheck for StaffDomainEligibility {
    fn qualifies_for_lifetime_grant(&self, subscriber: &Subscriber) -> bool {
        let domain = match subscriber.email.rsplit_once('@') {
            Some((_, domain)) => domain.to_ascii_lowercase(),
            None => return false,
        };
        self.domains.iter().any(|d| *d == domain)
    }
}

#[cfg(test)]
pub struct FixedEligibility(pub bool);

#[cfg(test)]
impl EligibilityCheck for FixedEligibility {
    fn qualifies_for_lifetime_grant(&self, _subscriber: &Subscriber) -> bool {
        self.0
    }
}
