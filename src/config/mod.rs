//! Layered configuration for bitpack
//!
//! Configuration is read from up to five layers, highest precedence first:
//!
//! 1. **Override** - process-wide values supplied through
//!    [`ConfigResolver::update_config_overrides`] (e.g. `BitPack::configure`)
//! 2. **Project** - `<exec dir>/.<type>rc`
//! 3. **User** - `<home>/.<type>rc`
//! 4. **Global** - `<prefix>/.<type>rc`, where `prefix` is itself resolved
//!    from the layers above plus the built-in defaults
//! 5. **Built-in** - `<module>/resources/.<type>rc`, or the defaults below when
//!    that file does not exist
//!
//! A context only sees the layers at or below its target: a `user` context
//! skips the project file and a `global` context skips both project and user.
//! Writes always go to the layer named by the target.
//!
//! # Built-in defaults
//!
//! | Key | Default |
//! |-----|---------|
//! | `cache` | `{home}/.{type}` |
//! | `debug` | `false` |
//! | `firebaseUrl` | `https://bitpack.firebaseio.com` |
//! | `prefix` | `/usr/local` |
//! | `serverUrl` | `https://bitpack.io` |
//!
//! # File format and security
//!
//! Every layer file is a JSON object. Files may contain auth tokens and
//! must have mode `0600`; anything else is refused with
//! [`BadConfigPermissions`](crate::core::BitpackError::BadConfigPermissions).

mod chain;
mod pack_config;
mod resolver;
mod tokens;
mod value;

pub use chain::{ChainLayers, ConfigDeleteResult, ConfigLayer, PackConfigChain, SharedConfig};
pub use pack_config::{CONFIG_FILE_MODE, PackConfig};
pub use resolver::{
    ConfigResolver, DEFAULT_FIREBASE_URL, DEFAULT_PREFIX, DEFAULT_SERVER_URL, config_file_name,
};
pub use tokens::{replace_tokens, replace_value_tokens};
pub use value::{ConfigProperties, ConfigValue};
