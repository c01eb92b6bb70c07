pub mod error;
pub mod icmp;
pub mod socket;
