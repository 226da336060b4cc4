//! Per-target output isolation.

use std::path::{Path, PathBuf};

use crate::driver::{CompileContext, CompileRequest, CompilerDriver, LinkRequest};
use crate::error::DriverError;

/// Wraps a driver so every compile writes under `output_dir/<target>`.
///
/// Built once when the coordinator is constructed and only read afterwards;
/// the target comes from the [`CompileContext`] of each call, so concurrent
/// workers share no mutable state.
#[derive(Debug, Clone)]
pub struct IsolatedOutputs<D> {
    inner: D,
}

impl<D> IsolatedOutputs<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Private output directory of `ctx.target` under `base`.
    pub fn output_dir(base: &Path, ctx: CompileContext<'_>) -> PathBuf {
        base.join(ctx.target)
    }
}

impl<D: CompilerDriver> CompilerDriver for IsolatedOutputs<D> {
    fn compile(&self, ctx: CompileContext<'_>, request: &CompileRequest) -> Result<Vec<PathBuf>, DriverError> {
        let isolated = CompileRequest {
            output_dir: Self::output_dir(&request.output_dir, ctx),
            ..request.clone()
        };
        self.inner.compile(ctx, &isolated)
    }

    fn link(&self, ctx: CompileContext<'_>, request: &LinkRequest) -> Result<PathBuf, DriverError> {
        self.inner.link(ctx, request)
    }
}
