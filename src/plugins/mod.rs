pub mod catalog;
pub mod dynamic;
pub mod references;
pub mod relay;
pub mod srd;
pub mod toggle;
