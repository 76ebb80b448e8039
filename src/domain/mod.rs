// ============================================================================
// Domain Layer
// ============================================================================
//
// Entity types and the error taxonomy shared by every other layer.
// Nothing in here talks to the store or the bus.
//
// ============================================================================

pub mod customer;
