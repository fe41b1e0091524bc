pub mod args;
pub mod op;
pub mod ops;

pub use ops::{
    Batch, Deploy, Details, Keygen, RecordVerification, Register, Serve, Verify, Version,
};
