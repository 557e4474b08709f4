//! Domain model for registries, schemes, codes, extensions and members.

mod code;
mod extension;
mod input;
mod labels;
mod status;
mod uri;

pub use code::{Code, CodeRegistry, CodeScheme, natural_key, validate_code_value};
pub use extension::{Extension, Member, PropertyContext, PropertyType};
pub use input::{CodeInput, EntityRef, ExtensionInput, MemberInput, RegistryInput, SchemeInput};
pub use labels::{FALLBACK_LANGUAGE, Labels};
pub use status::Status;
pub use uri::UriBuilder;
