//! Public launch-phase feature flags.

use crate::phase::LaunchPhase;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhaseConfigResponse {
    pub phase: u8,
    pub phase_name: String,
    pub registration_open: bool,
    pub requires_invite: bool,
    pub payment_active: bool,
    pub viral_invites: bool,
    pub shop_registration: bool,
    /// Monthly price in whole euros
    pub founding_member_price: i64,
}

impl From<LaunchPhase> for PhaseConfigResponse {
    fn from(phase: LaunchPhase) -> Self {
        Self {
            phase: phase.number(),
            phase_name: phase.name().to_string(),
            registration_open: phase.registration_open(),
            requires_invite: phase.requires_invite(),
            payment_active: phase.payment_active(),
            viral_invites: phase.viral_invites(),
            shop_registration: phase.shop_registration(),
            founding_member_price: phase.founding_member_price_cents() / 100,
        }
    }
}
