pub mod activities;
pub mod bundles;
pub mod callback;
pub mod workitems;
