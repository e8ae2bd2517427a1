//! Target resolution.
//!
//! Callers name what they want on a surface in whatever shape they hold: an
//! object, a scene index, an id string, a workspace view number. [`resolve`]
//! turns that into the `(kind, id)` pair the host understands, asking the host
//! where only it knows the answer.

use std::fmt;

use crate::error::{CompositorError, Result};
use crate::host::{Host, GET_SCENE_UID, GET_SOURCE_ITEM_IDS};
use crate::pool::CompositorManager;
use crate::surface::SurfaceKey;

/// What the host streams into a shared texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TargetKind {
    Scene,
    Item,
    Source,
    Workspace,
}

impl TargetKind {
    /// Kind tag used in the `NewWindow` content descriptor.
    pub fn wire_name(self) -> &'static str {
        match self {
            TargetKind::Scene => "dupscene",
            TargetKind::Item => "dupvideoitem",
            TargetKind::Source => "dupvideosource",
            TargetKind::Workspace => "dupworkspace",
        }
    }
}

/// A target reduced to the host's vocabulary.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResolvedTarget {
    pub kind: TargetKind,
    pub id: String,
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.wire_name(), self.id)
    }
}

/// Scene as handed out by the host's scene API.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SceneObject {
    pub index: u32,
    pub uid: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ItemObject {
    pub id: String,
}

/// Source with the ids of the items that show it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SourceObject {
    pub id: String,
    pub item_ids: Vec<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SceneRef {
    Object(SceneObject),
    /// Position in the host's scene list.
    Index(u32),
    Uid(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ItemRef {
    Object(ItemObject),
    Id(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SourceRef {
    Object(SourceObject),
    Id(String),
}

/// Workspace views the host can mirror.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WorkspaceView {
    Main = 0,
    Preview = 1,
}

impl TryFrom<u32> for WorkspaceView {
    type Error = CompositorError;

    fn try_from(view: u32) -> Result<Self> {
        match view {
            0 => Ok(WorkspaceView::Main),
            1 => Ok(WorkspaceView::Preview),
            other => Err(CompositorError::invalid_reference(format!(
                "workspace view {other} (expected 0 or 1)"
            ))),
        }
    }
}

/// Caller-facing target reference.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Target {
    Scene(SceneRef),
    Item(ItemRef),
    Source(SourceRef),
    /// Raw view number; only 0 and 1 resolve.
    Workspace(u32),
}

impl From<WorkspaceView> for Target {
    fn from(view: WorkspaceView) -> Self {
        Target::Workspace(view as u32)
    }
}

/// Whether `s` looks like `{8-4-4-4-12}` hex; braces are optional.
pub fn is_guid(s: &str) -> bool {
    let inner = match (s.strip_prefix('{'), s.strip_suffix('}')) {
        (Some(_), Some(_)) => &s[1..s.len() - 1],
        (None, None) => s,
        _ => return false,
    };
    // `Uuid::try_parse` also takes simple and urn forms; insist on hyphenated.
    inner.len() == 36 && uuid::Uuid::try_parse(inner).is_ok()
}

fn guid(kind: &str, id: &str) -> Result<String> {
    if is_guid(id) {
        Ok(id.to_string())
    } else {
        Err(CompositorError::invalid_reference(format!(
            "{kind} id `{id}` is not a guid"
        )))
    }
}

fn first_item(source: &str, item_ids: &[String]) -> Result<String> {
    item_ids
        .iter()
        .map(|id| id.trim())
        .find(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CompositorError::invalid_reference(format!("source `{source}` has no items"))
        })
}

/// Resolves `target`, calling the host for scene indices and source ids.
///
/// Nothing is cached; every call asks again.
pub async fn resolve<H: Host>(host: &H, target: &Target) -> Result<ResolvedTarget> {
    let (kind, id) = match target {
        Target::Scene(scene) => {
            let uid = match scene {
                SceneRef::Object(obj) => guid("scene", &obj.uid)?,
                SceneRef::Uid(uid) => guid("scene", uid)?,
                SceneRef::Index(index) => {
                    let reply = host.invoke(GET_SCENE_UID, &[index.to_string()]).await?;
                    guid("scene", reply.trim()).map_err(|_| {
                        CompositorError::invalid_reference(format!(
                            "no scene at index {index}"
                        ))
                    })?
                }
            };
            (TargetKind::Scene, uid)
        }
        Target::Item(item) => {
            let id = match item {
                ItemRef::Object(obj) => guid("item", &obj.id)?,
                ItemRef::Id(id) => guid("item", id)?,
            };
            (TargetKind::Item, id)
        }
        Target::Source(source) => {
            let id = match source {
                SourceRef::Object(obj) => first_item(&obj.id, &obj.item_ids)?,
                SourceRef::Id(id) => {
                    if id.trim().is_empty() {
                        return Err(CompositorError::invalid_reference("empty source id"));
                    }
                    let reply = host
                        .invoke(GET_SOURCE_ITEM_IDS, std::slice::from_ref(id))
                        .await?;
                    let items: Vec<String> = reply.split(',').map(str::to_string).collect();
                    first_item(id, &items)?
                }
            };
            (TargetKind::Source, id)
        }
        Target::Workspace(view) => {
            let view = WorkspaceView::try_from(*view)?;
            (TargetKind::Workspace, (view as u32).to_string())
        }
    };

    log::trace!("resolved {target:?} to {}:{id}", kind.wire_name());
    Ok(ResolvedTarget { kind, id })
}

impl<H: Host> CompositorManager<H> {
    /// Resolves `target` and binds it to the surface.
    ///
    /// An unresolvable target leaves the surface untouched.
    pub async fn draw_target(&mut self, key: impl Into<SurfaceKey>, target: &Target) -> Result<()> {
        let key = key.into();
        if self.surface(key).is_none() {
            return Err(CompositorError::SurfaceNotFound(key));
        }
        let resolved = resolve(self.host(), target).await?;
        self.set_target(key, resolved).await
    }
}
