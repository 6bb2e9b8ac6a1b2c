use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use deedbank_core::{ChildId, DeedTypeId, DomainError, DomainResult, ParentId};

/// Upper bound on `dollar_per_point`.
///
/// `i64::MAX` points at this rate stays well inside `Decimal`'s range, so
/// [`DollarRate::dollars_for`] cannot overflow.
pub const MAX_DOLLAR_PER_POINT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Exchange rate between one point and its dollar value, in
/// `(0, MAX_DOLLAR_PER_POINT]`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct DollarRate(Decimal);

impl DollarRate {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO {
            return Err(DomainError::validation(
                "dollar_per_point must be greater than zero",
            ));
        }
        if value > MAX_DOLLAR_PER_POINT {
            return Err(DomainError::validation(format!(
                "dollar_per_point must not exceed {MAX_DOLLAR_PER_POINT}"
            )));
        }
        Ok(Self(value))
    }

    /// One dollar per point, the rate used when a child is created without one.
    pub fn one() -> Self {
        Self(Decimal::new(100, 2))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Dollar value of `points` at this rate. Exact; never rounds.
    pub fn dollars_for(&self, points: i64) -> Decimal {
        Decimal::from(points) * self.0
    }
}

impl Default for DollarRate {
    fn default() -> Self {
        Self::one()
    }
}

impl TryFrom<Decimal> for DollarRate {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DollarRate> for Decimal {
    fn from(value: DollarRate) -> Self {
        value.0
    }
}

impl core::fmt::Display for DollarRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A parent account. Owns children and deed types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub id: ParentId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Parent {
    pub fn register(email: &str, created_at: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: ParentId::new(),
            email: normalize_email(email)?,
            created_at,
        })
    }
}

/// A child whose points ledger is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub id: ChildId,
    pub parent_id: ParentId,
    pub name: String,
    pub dollar_per_point: DollarRate,
    pub created_at: DateTime<Utc>,
}

impl Child {
    pub fn new(
        parent_id: ParentId,
        name: &str,
        dollar_per_point: DollarRate,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: ChildId::new(),
            parent_id,
            name: normalize_name(name, "child name")?,
            dollar_per_point,
            created_at,
        })
    }

    pub fn is_owned_by(&self, parent_id: ParentId) -> bool {
        self.parent_id == parent_id
    }
}

/// Template for deeds: a named, point-valued behavior defined by a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeedType {
    pub id: DeedTypeId,
    pub parent_id: ParentId,
    pub name: String,
    /// Non-zero; negative values describe "bad deeds".
    pub points: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl DeedType {
    pub fn new(
        parent_id: ParentId,
        name: &str,
        points: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_non_zero(points)?;
        Ok(Self {
            id: DeedTypeId::new(),
            parent_id,
            name: normalize_name(name, "deed type name")?,
            points,
            active: true,
            created_at,
        })
    }

    /// Names are unique per parent, ignoring case.
    pub fn same_name(&self, other: &str) -> bool {
        self.name.to_lowercase() == other.trim().to_lowercase()
    }
}

pub fn normalize_email(email: &str) -> DomainResult<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(DomainError::validation("email is required"));
    }
    Ok(email.to_lowercase())
}

pub fn normalize_name(name: &str, what: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation(format!("{what} is required")));
    }
    Ok(name.to_string())
}

/// Trim free text; blank text is treated as absent.
pub fn normalize_text(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub fn ensure_non_zero(points: i64) -> DomainResult<()> {
    if points == 0 {
        return Err(DomainError::invalid_points(
            "points must be non-zero to indicate a good or bad deed",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rate_must_be_positive() {
        assert!(DollarRate::new(dec!(0.25)).is_ok());
        assert!(matches!(DollarRate::new(dec!(0)), Err(DomainError::Validation(_))));
        assert!(matches!(DollarRate::new(dec!(-1)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn rate_is_capped_so_dollars_cannot_overflow() {
        assert!(DollarRate::new(MAX_DOLLAR_PER_POINT).is_ok());
        assert!(matches!(
            DollarRate::new(dec!(1000000.01)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            DollarRate::new(Decimal::MAX / dec!(2)),
            Err(DomainError::Validation(_))
        ));

        let max = DollarRate::new(MAX_DOLLAR_PER_POINT).unwrap();
        let expected: Decimal = "9223372036854775807000000".parse().unwrap();
        assert_eq!(max.dollars_for(i64::MAX), expected);
        assert_eq!(max.dollars_for(i64::MIN), -expected - MAX_DOLLAR_PER_POINT);
    }

    #[test]
    fn rate_deserialization_validates() {
        let ok: DollarRate = serde_json::from_str("\"0.10\"").unwrap();
        assert_eq!(ok.value(), dec!(0.10));
        assert!(serde_json::from_str::<DollarRate>("\"0\"").is_err());
    }

    #[test]
    fn dollars_are_exact() {
        let rate = DollarRate::new(dec!(0.10)).unwrap();
        assert_eq!(rate.dollars_for(3), dec!(0.30));
        assert_eq!(rate.dollars_for(-12), dec!(-1.20));
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let parent = Parent::register("  Mom@Example.COM ", Utc::now()).unwrap();
        assert_eq!(parent.email, "mom@example.com");
        assert!(Parent::register("   ", Utc::now()).is_err());
    }

    #[test]
    fn deed_type_rejects_zero_points_and_blank_name() {
        let parent = ParentId::new();
        assert!(matches!(
            DeedType::new(parent, "Dishes", 0, Utc::now()),
            Err(DomainError::InvalidPoints(_))
        ));
        assert!(matches!(
            DeedType::new(parent, "  ", 5, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn deed_type_names_compare_case_insensitively() {
        let dt = DeedType::new(ParentId::new(), " Make Bed ", 2, Utc::now()).unwrap();
        assert_eq!(dt.name, "Make Bed");
        assert!(dt.active);
        assert!(dt.same_name("make bed"));
        assert!(!dt.same_name("make the bed"));
    }

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalize_text(Some("  ")), None);
        assert_eq!(normalize_text(Some(" ok ")), Some("ok".to_string()));
        assert_eq!(normalize_text(None), None);
    }
}
