/// For data that is persisted on the user's hard disk, we use this trait to keep a clear
/// distinction between structs that are used for our application logic and structs that are
/// serialized: suppose we rename a field of a domain struct and forget that the same struct also
/// lives on some users' file systems as a JSON document. Then loading would fail (and, since
/// skipwarden falls back to defaults on malformed input, the user's blacklist would silently be
/// replaced by an empty one on the next write).
///
/// The following rules apply to data persisted through a `KeyValueStore`:
/// - Every struct annotated with #[derive(Serialize)] resides in the file_io module and is not
///   public. Other modules use a domain struct without serde derives, and data is converted
///   explicitly between the two.
/// - Serialized structs carry a version suffix, e.g. V1, V2. To rename a field, introduce a new
///   version instead of modifying the existing struct, and keep deserializing the old one until
///   (almost) no user has data in the old format lying around.
/// - Every persisted document carries a `version` field, checked at the load boundary.
pub trait Versioned<T>: From<T> + Into<T> {}
