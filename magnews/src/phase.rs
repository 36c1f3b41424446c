//! Launch phases gate which site features are switched on.
//!
//! | Phase | Name                             | Registration | Payments | Viral invites | Shops |
//! |-------|----------------------------------|--------------|----------|---------------|-------|
//! | 0     | Pre-Launch Email Collection      | invite only  | no       | no            | no    |
//! | 1     | Private Beta with Viral Invites  | invite only  | no       | yes           | no    |
//! | 2     | Community & Shop Partnerships    | invite only  | yes      | yes           | yes   |
//! | 3     | Public Launch                    | open         | yes      | yes           | yes   |
//!
//! Phase 0 additionally restricts invites to admin-issued ones. Founding members pay 100 cents a
//! month until the public launch, after which the price is 400 cents.

/// Highest phase [`crate::config::Config::validate`] accepts.
pub const MAX_PHASE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPhase(pub u8);

impl LaunchPhase {
    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "Pre-Launch Email Collection",
            1 => "Private Beta with Viral Invites",
            2 => "Community & Shop Partnerships",
            3 => "Public Launch",
            _ => "Unknown Phase",
        }
    }

    pub fn registration_open(&self) -> bool {
        self.0 >= 3
    }

    pub fn requires_invite(&self) -> bool {
        self.0 < 3
    }

    pub fn payment_active(&self) -> bool {
        self.0 >= 2
    }

    pub fn viral_invites(&self) -> bool {
        self.0 >= 1
    }

    pub fn shop_registration(&self) -> bool {
        self.0 >= 2
    }

    pub fn admin_invite_only(&self) -> bool {
        self.0 == 0
    }

    /// Monthly founding member price in cents.
    pub fn founding_member_price_cents(&self) -> i64 {
        if self.0 >= 3 { 400 } else { 100 }
    }
}
