// @generated
// This file is @generated by prost-build.
/// Per-call telemetry record published for every admitted call.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Event {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub consumer: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub method: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub host: ::prost::alloc::string::String,
}
/// Aggregated call counts for one statistics window.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Stat {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(map = "string, uint64", tag = "2")]
    pub by_method: ::std::collections::HashMap<::prost::alloc::string::String, u64>,
    #[prost(map = "string, uint64", tag = "3")]
    pub by_consumer: ::std::collections::HashMap<
        ::prost::alloc::string::String,
        u64,
    >,
}
/// Window length for a statistics subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct StatInterval {
    #[prost(uint64, tag = "1")]
    pub interval_seconds: u64,
}
#[derive(Clone, Copy, PartialEq, Eq, Hash, ::prost::Message)]
pub struct Nothing {
    #[prost(bool, tag = "1")]
    pub dummy: bool,
}
include!("gateway.v1.tonic.rs");
// @@protoc_insertion_point(module)
