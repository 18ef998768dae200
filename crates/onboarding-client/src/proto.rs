//! Onboarding manager protocol messages (`onboardingmgr.v1`)
//!
//! Only the two RPCs the device side needs are described here, so the messages
//! are declared with the prost derives directly instead of going through a
//! build script.

/// Fully qualified path of the non-interactive registration stream
pub const ONBOARD_NODE_STREAM_PATH: &str =
    "/onboardingmgr.v1.NonInteractiveOnboardingService/OnboardNodeStream";

/// Fully qualified path of the interactive node registration RPC
pub const CREATE_NODES_PATH: &str = "/onboardingmgr.v1.InteractiveOnboardingService/CreateNodes";

#[derive(Clone, PartialEq, prost::Message)]
pub struct OnboardNodeStreamRequest {
    #[prost(string, tag = "1")]
    pub mac_id: String,
    #[prost(string, tag = "2")]
    pub uuid: String,
    #[prost(string, tag = "3")]
    pub serialnum: String,
    #[prost(string, tag = "4")]
    pub host_ip: String,
}

/// `google.rpc.Status` as carried inside the stream response
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum NodeState {
    Unspecified = 0,
    Registered = 1,
    Onboarded = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OnboardNodeStreamResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,
    #[prost(enumeration = "NodeState", tag = "2")]
    pub node_state: i32,
    #[prost(string, tag = "3")]
    pub client_id: String,
    #[prost(string, tag = "4")]
    pub client_secret: String,
    #[prost(string, tag = "5")]
    pub project_id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HwData {
    #[prost(string, tag = "1")]
    pub mac_id: String,
    #[prost(string, tag = "2")]
    pub sut_ip: String,
    #[prost(string, tag = "3")]
    pub uuid: String,
    #[prost(string, tag = "4")]
    pub serialnum: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NodeData {
    #[prost(message, repeated, tag = "1")]
    pub hwdata: Vec<HwData>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateNodesRequest {
    #[prost(message, repeated, tag = "1")]
    pub payload: Vec<NodeData>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateNodesResponse {
    #[prost(string, tag = "1")]
    pub project_id: String,
}
