//! Data types exchanged with the engine.

pub mod credential;
pub mod dataset;
pub mod document;
pub mod frame;
pub mod options;
pub mod program;
pub mod response;
pub mod tool_def;
pub mod workspace;

pub use credential::{Credential, CredentialType, ListCredentialsOptions};
pub use dataset::{DatasetElement, DatasetElementMeta};
pub use document::{Document, Node, TextNode, ToolNode};
pub use frame::*;
pub use options::{
    ListModelsOptions, LoadOptions, Options, ParseOptions, RequestPayload, RunTarget,
};
pub use program::{Program, Tool, ToolSet, ToolSource};
pub use response::{AuthResponse, PromptResponse};
pub use tool_def::{render_tools, FreeForm, ToolDef};
pub use workspace::{FileInfo, PrefixOptions, RevisionInfo, WriteFileOptions};
