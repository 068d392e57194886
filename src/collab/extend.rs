//! Extender passing primary assemblies through.

use super::Extender;
use crate::assembly::{ExtendedAssembly, PrimaryAssembly};

/// Produces one extended assembly per primary assembly, unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityExtender;

impl Extender for IdentityExtender {
    fn extend(&self, primary: &PrimaryAssembly) -> Result<Vec<ExtendedAssembly>, anyhow::Error> {
        Ok(vec![ExtendedAssembly::from(primary.clone())])
    }
}
