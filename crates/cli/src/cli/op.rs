use std::error::Error;
use std::fmt::Display;
use std::path::PathBuf;

use common::error::Categorize;
use qdv_cli::{AppState, StateError};

#[derive(Clone, Debug, Default)]
pub struct OpContext {
    /// Optional custom config path (defaults to ~/.qdv)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    /// Load the initialized app state
    pub fn state(&self) -> Result<AppState, StateError> {
        AppState::load(self.config_path.clone())
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Categorize + Send + Sync + 'static;
    type Output: Display + Send;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Declare the subcommands of the binary
///
/// Generates `Command` (the clap subcommand enum) and `OpError`, which keeps
/// each op's own error and its category. Every op renders its output as text.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        impl Command {
            /// Subcommand name for log spans
            pub fn name(&self) -> &'static str {
                match self {
                    $(Command::$variant(_) => stringify!($variant),)*
                }
            }
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        impl common::error::Categorize for OpError {
            fn kind(&self) -> common::error::ErrorKind {
                match self {
                    $(
                        OpError::$variant(e) => common::error::Categorize::kind(e),
                    )*
                }
            }
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = String;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<String, OpError> {
                match self {
                    $(
                        Command::$variant(op) => op.execute(ctx).await.map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
