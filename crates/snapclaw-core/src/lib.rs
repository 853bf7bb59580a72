pub mod streaks;
pub mod sweeper;
