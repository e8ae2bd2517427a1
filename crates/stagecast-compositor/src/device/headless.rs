use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::math::ColumnMajor;
use crate::surface::ElementId;

use super::context::{
    BufferId, GraphicsContext, PlatformSurface, ProgramId, ProgramLayout, QuadDraw, ShaderId,
    ShaderStage, SharedTextureExt, TextureDesc, TextureId, Uniform,
};

/// Texture size limit reported by headless contexts (wgpu's default limit).
pub const HEADLESS_MAX_TEXTURE_SIZE: u32 = 8192;

/// One recorded context call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetViewport { width: u32, height: u32 },
    SetClearColor([f32; 4]),
    CompileShader { stage: ShaderStage, shader: ShaderId },
    LinkProgram { program: ProgramId, layout: ProgramLayout },
    SetUniform { program: ProgramId, uniform: Uniform, value: ColumnMajor },
    CreateBuffer { buffer: BufferId, data: Vec<f32> },
    UpdateBuffer { buffer: BufferId, data: Vec<f32> },
    CreateTexture { texture: TextureId, desc: TextureDesc, shared: bool },
    SetShareNext(bool),
    DrawQuad(QuadDraw),
    DeleteTexture(TextureId),
    DeleteBuffer(BufferId),
    DeleteProgram(ProgramId),
    DeleteShader(ShaderId),
}

/// Failures the headless backend injects on request.
#[derive(Debug, Clone, Default)]
pub struct HeadlessFaults {
    pub context_unavailable: bool,
    pub no_sharing: bool,
    pub compile: Option<ShaderStage>,
    pub link: bool,
    pub texture: bool,
}

/// Call log shared by every context acquired from one [`HeadlessSurface`].
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn draws(&self) -> usize {
        self.count(|c| matches!(c, Call::DrawQuad(_)))
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }
}

/// GPU-less platform surface for CI and tests.
///
/// Contexts it hands out allocate plain integer ids, issue synthetic non-zero
/// shared handles and record every call in a shared [`CallLog`].
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    element: ElementId,
    size: Rc<Cell<(u32, u32)>>,
    faults: Rc<RefCell<HeadlessFaults>>,
    log: CallLog,
    next_handle: Rc<Cell<u64>>,
}

impl HeadlessSurface {
    pub fn new(element: u64, width: u32, height: u32) -> Self {
        Self {
            element: ElementId(element),
            size: Rc::new(Cell::new((width, height))),
            faults: Rc::new(RefCell::new(HeadlessFaults::default())),
            log: CallLog::default(),
            next_handle: Rc::new(Cell::new(0x4000_0001)),
        }
    }

    pub fn with_faults(self, faults: HeadlessFaults) -> Self {
        *self.faults.borrow_mut() = faults;
        self
    }

    /// Replaces the injected faults; affects contexts already handed out.
    pub fn set_faults(&self, faults: HeadlessFaults) {
        *self.faults.borrow_mut() = faults;
    }

    pub fn set_pixel_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl PlatformSurface for HeadlessSurface {
    fn element_id(&self) -> ElementId {
        self.element
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.size.get()
    }

    fn acquire_context(&self) -> Option<Box<dyn GraphicsContext>> {
        if self.faults.borrow().context_unavailable {
            return None;
        }
        Some(Box::new(HeadlessContext {
            log: self.log.clone(),
            faults: Rc::clone(&self.faults),
            next_id: 1,
            share: HeadlessShare {
                log: self.log.clone(),
                share_next: false,
                handles: HashMap::new(),
                next_handle: Rc::clone(&self.next_handle),
            },
        }))
    }
}

/// Context issued by [`HeadlessSurface`].
#[derive(Debug)]
pub struct HeadlessContext {
    log: CallLog,
    faults: Rc<RefCell<HeadlessFaults>>,
    next_id: u32,
    share: HeadlessShare,
}

impl HeadlessContext {
    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GraphicsContext for HeadlessContext {
    fn set_viewport(&mut self, width: u32, height: u32) {
        self.log.push(Call::SetViewport { width, height });
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.log.push(Call::SetClearColor(rgba));
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        if self.faults.borrow().compile == Some(stage) {
            return Err(format!("headless: injected {stage} compile failure"));
        }
        if source.trim().is_empty() {
            return Err("headless: empty shader source".to_string());
        }
        let shader = ShaderId(self.alloc());
        self.log.push(Call::CompileShader { stage, shader });
        Ok(shader)
    }

    fn link_program(
        &mut self,
        _vertex: ShaderId,
        _fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, String> {
        if self.faults.borrow().link {
            return Err("headless: injected link failure".to_string());
        }
        let program = ProgramId(self.alloc());
        self.log.push(Call::LinkProgram {
            program,
            layout: *layout,
        });
        Ok(program)
    }

    fn set_uniform_matrix(&mut self, program: ProgramId, uniform: Uniform, value: &ColumnMajor) {
        self.log.push(Call::SetUniform {
            program,
            uniform,
            value: *value,
        });
    }

    fn create_buffer(&mut self, data: &[f32]) -> BufferId {
        let buffer = BufferId(self.alloc());
        self.log.push(Call::CreateBuffer {
            buffer,
            data: data.to_vec(),
        });
        buffer
    }

    fn update_buffer(&mut self, buffer: BufferId, data: &[f32]) {
        self.log.push(Call::UpdateBuffer {
            buffer,
            data: data.to_vec(),
        });
    }

    fn max_texture_size(&self) -> u32 {
        HEADLESS_MAX_TEXTURE_SIZE
    }

    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> Result<TextureId, String> {
        if self.faults.borrow().texture {
            return Err("headless: injected texture failure".to_string());
        }
        let expected = desc.width as usize * desc.height as usize * 4;
        if rgba.len() != expected {
            return Err(format!(
                "headless: {} bytes for a {}x{} texture",
                rgba.len(),
                desc.width,
                desc.height
            ));
        }

        let texture = TextureId(self.alloc());
        let shared = self.share.share_next;
        if shared {
            self.share.issue(texture);
        }
        self.log.push(Call::CreateTexture {
            texture,
            desc: *desc,
            shared,
        });
        Ok(texture)
    }

    fn draw_quad(&mut self, draw: &QuadDraw) {
        self.log.push(Call::DrawQuad(*draw));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.share.handles.remove(&texture);
        self.log.push(Call::DeleteTexture(texture));
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.log.push(Call::DeleteBuffer(buffer));
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.log.push(Call::DeleteProgram(program));
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.log.push(Call::DeleteShader(shader));
    }

    fn sharing(&mut self) -> Option<&mut dyn SharedTextureExt> {
        if self.faults.borrow().no_sharing {
            return None;
        }
        Some(&mut self.share)
    }
}

#[derive(Debug)]
struct HeadlessShare {
    log: CallLog,
    share_next: bool,
    handles: HashMap<TextureId, u64>,
    next_handle: Rc<Cell<u64>>,
}

impl HeadlessShare {
    fn issue(&mut self, texture: TextureId) {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        self.handles.insert(texture, handle);
    }
}

impl SharedTextureExt for HeadlessShare {
    fn set_share_next(&mut self, on: bool) {
        self.share_next = on;
        self.log.push(Call::SetShareNext(on));
    }

    fn shared_handle(&mut self, texture: TextureId) -> Option<u64> {
        self.handles.get(&texture).copied()
    }
}
