pub mod company;
pub mod growth;
pub mod peers;
