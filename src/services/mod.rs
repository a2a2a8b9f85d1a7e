pub mod applications;
pub mod audit;
pub mod invoices;
pub mod leases;
pub mod maintenance;
pub mod payments;
pub mod scheduler;
pub mod units;
pub mod views;

#[cfg(test)]
mod lifecycle_tests;
#[cfg(test)]
pub(crate) mod testing;
