/// Common identifying field for event identities (i.e., activities)
///
/// _Note_: While the concept XES extension is the de-facto standard for identifying activity names,
/// some XES files might not use `concept:name`; the key used for mining is configurable via
/// [`crate::MiningConfig::activity_key`].
pub const ACTIVITY_NAME: &str = "concept:name";
/// Common field for event timestamps (time XES extension)
pub const TIMESTAMP_NAME: &str = "time:timestamp";
/// Common identifying field for trace identities (i.e., case IDs)
///
/// See also [`ACTIVITY_NAME`]
pub const TRACE_ID_NAME: &str = "concept:name";
/// Event attribute flagging an event as sending or receiving a message
///
/// Expected values are `send` and `receive` (case-insensitive)
pub const MESSAGE_TYPE_NAME: &str = "msgType";
/// Event attribute holding the correlation id shared by the send and the receive event of one message
pub const MESSAGE_ID_NAME: &str = "msgInstanceId";
