pub mod credentials;
pub mod signature_v4;

pub use credentials::{
    ChainCredentialProvider, CredentialProvider, Credentials, EnvCredentialProvider,
    ProfileCredentialProvider, StaticCredentialProvider,
};
pub use signature_v4::{RequestToSign, SignedRequest, sign_request};
