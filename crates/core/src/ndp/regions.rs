//! Fixed DRAM addresses of the two NDP-control regions: the DIMM-level
//! launch-request mailbox and the per-pseudo-channel control register that
//! starts the NDP unit.

use crate::common::coord::CoordVec;
use crate::config::OrgConfig;

fn bank_group_for(org: &OrgConfig, x4_x8_value: i64, x16_value: i64) -> i64 {
    if org.dq >= 16 {
        x16_value
    } else {
        x4_x8_value
    }
}

/// The `(row, bank, bg)` coordinates of the launch-request region, leaving
/// channel/pseudo-channel/rank/column unspecified for the caller to fill.
#[must_use]
pub fn launch_request_addr(org: &OrgConfig) -> CoordVec {
    let mut addr = CoordVec::unspecified();
    addr.row = org.rows as i64 - 1;
    addr.bank = 3;
    addr.bankgroup = bank_group_for(org, 6, 2);
    addr
}

/// The `(row, bank, bg)` coordinates of the NDP control register.
#[must_use]
pub fn control_register_addr(org: &OrgConfig) -> CoordVec {
    let mut addr = CoordVec::unspecified();
    addr.row = org.rows as i64 - 1;
    addr.bank = 3;
    addr.bankgroup = bank_group_for(org, 7, 3);
    addr
}

/// True if `addr`'s row/bank/bankgroup match the control register, ignoring
/// channel/pseudo-channel/rank/column.
#[must_use]
pub fn is_control_register(org: &OrgConfig, addr: &CoordVec) -> bool {
    let reg = control_register_addr(org);
    addr.row == reg.row && addr.bank == reg.bank && addr.bankgroup == reg.bankgroup
}

/// True if `addr`'s row/bank/bankgroup match the DIMM-level launch-request
/// mailbox, ignoring channel/pseudo-channel/rank/column.
#[must_use]
pub fn is_launch_region(org: &OrgConfig, addr: &CoordVec) -> bool {
    let reg = launch_request_addr(org);
    addr.row == reg.row && addr.bank == reg.bank && addr.bankgroup == reg.bankgroup
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x8_and_x16_pick_different_bank_groups() {
        let mut org = OrgConfig::default();
        org.dq = 8;
        let x8 = control_register_addr(&org);
        org.dq = 16;
        let x16 = control_register_addr(&org);
        assert_ne!(x8.bankgroup, x16.bankgroup);
    }

    #[test]
    fn launch_and_control_regions_are_distinct() {
        let org = OrgConfig::default();
        let launch = launch_request_addr(&org);
        let control = control_register_addr(&org);
        assert_ne!(launch.bankgroup, control.bankgroup);
    }

    #[test]
    fn is_launch_region_ignores_channel_and_pseudochannel() {
        let org = OrgConfig::default();
        let mut addr = launch_request_addr(&org);
        addr.channel = 1;
        addr.pseudochannel = 1;
        assert!(is_launch_region(&org, &addr));
        assert!(!is_control_register(&org, &addr));
    }
}
