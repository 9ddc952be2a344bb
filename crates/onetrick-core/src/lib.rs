pub mod activity;
pub mod clock;
pub mod ids;
pub mod link;
pub mod loadout;
