mod common;
mod registry;
mod validation;
