pub mod apply;
pub mod init;
pub mod match_roster;
