pub mod schema;

pub use schema::{
    ClassifierConfig, Config, GatewayConfig, LedgerConfig, LedgerMode, OperatorConfig,
    SIGNER_KEY_ENV, SignerConfig,
};
