//! Prescriptions (clinical orders) domain module.
//!
//! An order is a header plus an ordered list of line items, always written as
//! one unit. This crate holds the write payload and its validation, the
//! status and total policies, and the read model. No IO, no storage.

pub mod draft;
pub mod order;
pub mod status;
pub mod total;

pub use draft::{LineItemDraft, OrderDraft};
pub use order::{ClinicalOrder, OrderDetails, OrderLineItem, UNKNOWN_CLINICIAN, UNKNOWN_PATIENT};
pub use status::{OrderStatus, StatusPolicy};
pub use total::{to_cents, TotalCheck, TotalPolicy};
