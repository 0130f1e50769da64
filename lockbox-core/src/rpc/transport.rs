//! Transport seam for RPC calls.

use crate::rpc::models::RpcMethod;
use crate::rpc::RpcFailure;
use async_trait::async_trait;

/// Carries one encoded request to the server and returns the encoded reply.
///
/// Implementations map their native failures (connection refused, HTTP
/// status codes, ...) into [`RpcFailure`] so nothing above this trait sees
/// transport-specific errors.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        method: RpcMethod,
        access_token: Option<&str>,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, RpcFailure>;
}
