use serde::{Deserialize, Serialize};

/// Facts the arbiter rules on. `spam_rejected` comes from the rate guard,
/// which stamps every attempt before any quota question is asked, so a
/// quota-blocked message still counts toward the spam window.
#[derive(Clone, Copy, Debug)]
pub struct AccessRequest {
    pub spam_rejected: bool,
    pub privileged: bool,
    pub entitled: bool,
    pub daily_limit: Option<u32>,
    pub used_today: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitBasis {
    Privileged,
    Entitled,
    Unmetered,
    Metered { used: u32, limit: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Spam,
    Quota { used: u32, limit: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Admitted(AdmitBasis),
    Blocked(BlockReason),
}

impl AccessDecision {
    /// Only metered admissions consume daily quota, and only after the
    /// completion succeeded.
    pub fn consumes_quota(&self) -> bool {
        matches!(self, Self::Admitted(AdmitBasis::Metered { .. }))
    }

    pub fn basis_str(&self) -> &'static str {
        match self {
            Self::Admitted(AdmitBasis::Privileged) => "privileged",
            Self::Admitted(AdmitBasis::Entitled) => "entitled",
            Self::Admitted(AdmitBasis::Unmetered) => "unmetered",
            Self::Admitted(AdmitBasis::Metered { .. }) => "metered",
            Self::Blocked(BlockReason::Spam) => "spam",
            Self::Blocked(BlockReason::Quota { .. }) => "quota",
        }
    }
}

/// The arbiter table, evaluated top to bottom: spam rejection first,
/// privileged and entitled bypass second, then the tier's meter.
pub fn decide(request: AccessRequest) -> AccessDecision {
    if request.spam_rejected {
        return AccessDecision::Blocked(BlockReason::Spam);
    }

    if request.privileged {
        return AccessDecision::Admitted(AdmitBasis::Privileged);
    }
    if request.entitled {
        return AccessDecision::Admitted(AdmitBasis::Entitled);
    }

    let Some(limit) = request.daily_limit else {
        return AccessDecision::Admitted(AdmitBasis::Unmetered);
    };

    if request.used_today < limit {
        AccessDecision::Admitted(AdmitBasis::Metered { used: request.used_today, limit })
    } else {
        AccessDecision::Blocked(BlockReason::Quota { used: request.used_today, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::{decide, AccessDecision, AccessRequest, AdmitBasis, BlockReason};

    fn request() -> AccessRequest {
        AccessRequest {
            spam_rejected: false,
            privileged: false,
            entitled: false,
            daily_limit: Some(3),
            used_today: 0,
        }
    }

    #[test]
    fn spam_rejection_outranks_every_bypass() {
        let decision = decide(AccessRequest {
            spam_rejected: true,
            privileged: true,
            entitled: true,
            ..request()
        });
        assert_eq!(decision, AccessDecision::Blocked(BlockReason::Spam));
    }

    #[test]
    fn privileged_user_skips_the_meter_entirely() {
        let decision = decide(AccessRequest { privileged: true, used_today: 99, ..request() });
        assert_eq!(decision, AccessDecision::Admitted(AdmitBasis::Privileged));
        assert!(!decision.consumes_quota());
    }

    #[test]
    fn active_entitlement_admits_past_the_limit() {
        let decision = decide(AccessRequest { entitled: true, used_today: 3, ..request() });
        assert_eq!(decision, AccessDecision::Admitted(AdmitBasis::Entitled));
        assert!(!decision.consumes_quota());
    }

    #[test]
    fn unmetered_tier_never_consumes_quota() {
        let decision = decide(AccessRequest { daily_limit: None, used_today: 50, ..request() });
        assert_eq!(decision, AccessDecision::Admitted(AdmitBasis::Unmetered));
        assert!(!decision.consumes_quota());
    }

    #[test]
    fn metered_admission_reports_the_meter_state() {
        let decision = decide(AccessRequest { used_today: 2, ..request() });
        assert_eq!(decision, AccessDecision::Admitted(AdmitBasis::Metered { used: 2, limit: 3 }));
        assert!(decision.consumes_quota());
    }

    #[test]
    fn exhausted_meter_blocks_with_quota() {
        for used in [3, 4] {
            let decision = decide(AccessRequest { used_today: used, ..request() });
            assert_eq!(decision, AccessDecision::Blocked(BlockReason::Quota { used, limit: 3 }));
        }
    }
}
