/// Identifies a wire message type. The associated constant stands in for
/// the reflection-derived static identifier the original dispatcher reads
/// off each generated request/response class; here it is just a plain
/// trait constant, no code generation required.
pub trait Message: Send + 'static {
    const URI: u32;
}
