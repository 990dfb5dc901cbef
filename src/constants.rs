// -
// Namespace layout

/// Root of every namespace; never deleted
pub const ROOT_PATH: &str = "/";

pub(crate) const PATH_SEPARATOR: char = '/';

/// Reserved nodes present in a freshly initialized namespace
pub const RESERVED_PATH: &str = "/zookeeper";
pub const RESERVED_QUOTA_PATH: &str = "/zookeeper/quota";

/// Width of the zero-padded suffix appended to sequential nodes
pub(crate) const SEQUENTIAL_SUFFIX_WIDTH: usize = 10;

/// Owner id carried by persistent nodes
pub(crate) const PERSISTENT_OWNER: i64 = 0;
