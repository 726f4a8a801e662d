pub mod chat;
pub mod dispatcher;
pub mod ledger;
pub mod locks;
pub mod reconciler;
pub mod registry;
