pub mod binary;
pub mod execution;
pub mod validation;

#[cfg(test)]
mod testing;

pub use binary::{
    error::{DecodeError, LoadError},
    module::Module,
    options::LoadOptions,
};
pub use validation::ValidationError;
