use serde::{Deserialize, Serialize};

/// Account role. Drives capability checks — never inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Store,
    Repair,
    Admin,
}

/// What a role is allowed to do. Computed from [`Role`], checked at the
/// request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CanSell,
    CanManageStore,
    CanManageRepairShop,
    IsAdmin,
}

impl Role {
    pub fn has(self, cap: Capability) -> bool {
        match cap {
            Capability::CanSell => matches!(
                self,
                Role::Seller | Role::Store | Role::Repair | Role::Admin
            ),
            Capability::CanManageStore => matches!(self, Role::Store | Role::Admin),
            Capability::CanManageRepairShop => matches!(self, Role::Repair | Role::Admin),
            Capability::IsAdmin => matches!(self, Role::Admin),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Store => "store",
            Role::Repair => "repair",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(Role::Buyer),
            "seller" => Some(Role::Seller),
            "store" => Some(Role::Store),
            "repair" => Some(Role::Repair),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Condition {
    pub fn as_str(self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Excellent => "excellent",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Condition::New),
            "excellent" => Some(Condition::Excellent),
            "good" => Some(Condition::Good),
            "fair" => Some(Condition::Fair),
            "poor" => Some(Condition::Poor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Automatic,
    Manual,
    Quartz,
    Solar,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Automatic => "automatic",
            MovementType::Manual => "manual",
            MovementType::Quartz => "quartz",
            MovementType::Solar => "solar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(MovementType::Automatic),
            "manual" => Some(MovementType::Manual),
            "quartz" => Some(MovementType::Quartz),
            "solar" => Some(MovementType::Solar),
            _ => None,
        }
    }
}

/// Listing lifecycle. Removal is a soft transition — the row is never
/// deleted, it moves to `Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
    Pending,
    Removed,
}

impl ListingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Sold => "sold",
            ListingStatus::Pending => "pending",
            ListingStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ListingStatus::Active),
            "sold" => Some(ListingStatus::Sold),
            "pending" => Some(ListingStatus::Pending),
            "removed" => Some(ListingStatus::Removed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }
}

/// Store promotion plans and their paid windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionPlan {
    Spotlight,
    Featured,
}

impl PromotionPlan {
    pub fn as_str(self) -> &'static str {
        match self {
            PromotionPlan::Spotlight => "spotlight",
            PromotionPlan::Featured => "featured",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spotlight" => Some(PromotionPlan::Spotlight),
            "featured" => Some(PromotionPlan::Featured),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PromotionPlan::Spotlight => "Spotlight",
            PromotionPlan::Featured => "Featured",
        }
    }

    pub fn duration_days(self) -> i64 {
        match self {
            PromotionPlan::Spotlight => 30,
            PromotionPlan::Featured => 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_roles() {
        assert!(Role::Seller.has(Capability::CanSell));
        assert!(Role::Store.has(Capability::CanSell));
        assert!(Role::Store.has(Capability::CanManageStore));
        assert!(!Role::Seller.has(Capability::CanManageStore));
        assert!(!Role::Buyer.has(Capability::CanSell));
        assert!(Role::Admin.has(Capability::CanManageRepairShop));
        assert!(!Role::Repair.has(Capability::IsAdmin));
    }

    #[test]
    fn enum_round_trips() {
        for s in ["buyer", "seller", "store", "repair", "admin"] {
            assert_eq!(Role::parse(s).unwrap().as_str(), s);
        }
        for s in ["active", "sold", "pending", "removed"] {
            assert_eq!(ListingStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(Role::parse("superuser").is_none());
        assert!(ListingStatus::parse("deleted").is_none());
    }

    #[test]
    fn promotion_windows() {
        assert_eq!(PromotionPlan::Spotlight.duration_days(), 30);
        assert_eq!(PromotionPlan::Featured.duration_days(), 90);
    }
}
