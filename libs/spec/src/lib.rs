//! # fleet-spec
//!
//! Per-instance configuration records for the fleet director.
//!
//! ## Pipeline
//!
//! For every managed instance the director:
//!
//! 1. Assembles a canonical [`FullSpec`] from the deployment, the instance
//!    group definition, resolved network settings and the persistent disk
//!    fragment ([`InstanceSpec`]).
//! 2. Projects it into a [`TemplateView`] with interpolated properties,
//!    resolved links, DNS record names and a selected routable IP
//!    ([`TemplateSpecProjector`]).
//! 3. Hands the view to a rendering engine (outside this crate) and stores the
//!    resulting hashes on the instance's [`RenderState`].
//! 4. Projects the post-render record into the minimal [`ApplyView`] sent to
//!    the instance agent ([`apply_spec`]).
//!
//! ## Invariants
//!
//! - Views are throwaway projections; nothing flows back from a view into a
//!   record. Render outputs reach the record only through [`RenderState`].
//! - Post-render fields are overlaid from the instance on every read, so a
//!   record built before rendering never shows stale render outputs.

pub mod apply_spec;
pub mod dns;
mod error;
pub mod full_spec;
mod group;
mod instance;
pub mod links;
mod record;
mod rendered;
mod template_spec;
pub mod variables;

pub use error::{InterpolationError, LinkError, SpecError};
pub use full_spec::InstanceSpec;
pub use group::{
    DiskType, InstanceGroup, JobTemplate, Lifecycle, PersistentDisk, PersistentDiskCollection,
    Stemcell, UpdateSpec, VmResources, VmType,
};
pub use instance::{Instance, InstancePlan, RenderState, VariableSetId};
pub use record::{ApplyView, FullSpec, TemplateView};
pub use rendered::{RenderedJobInstance, RenderedJobTemplate, RenderedTemplatesArchive};
pub use template_spec::{
    ProjectionMode, TemplateSpecProjector, VariableGeneration, DYNAMIC_PLACEHOLDER_ADDRESS,
    LINK_SPEC_KEYS, TEMPLATE_SPEC_KEYS,
};
