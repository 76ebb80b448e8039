// ============================================================================
// Customer Domain
// ============================================================================
//
// - Customer / NewCustomer (the managed entity and its create input)
// - ChangeCommand (the ADD / DELETE notification payload)
// - Fixed-format registration timestamp
// - CustomerError (NotFound / Decode / Store / Publish)
//
// ============================================================================

pub mod commands;
pub mod errors;
pub mod model;
pub mod timestamp;

pub use commands::*;
pub use errors::*;
pub use model::*;
