//! In-memory [`TerrainBackend`] that records every command it receives.

use relief_dem::ElevationLevel;

use crate::backend::{FramebufferId, Program, RenderState, TerrainBackend, TextureId};
use crate::uniforms::{PrepareUniforms, ShadeUniforms};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    CreateFramebuffer(FramebufferId),
    BindFramebuffer(FramebufferId),
    AttachColor(FramebufferId, TextureId),
    BindDefaultFramebuffer,
    UploadElevation {
        texture: TextureId,
        sizes: Vec<(u32, u32)>,
    },
    ApplyRenderState(RenderState),
    Clear {
        color: [f32; 4],
        depth: f32,
    },
    Draw {
        program: Program,
        texture: TextureId,
        target: Option<FramebufferId>,
        zoom: f32,
    },
    GenerateMipmaps(TextureId),
    DeleteTexture(TextureId),
    DeleteFramebuffer(FramebufferId),
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    commands: Vec<Command>,
    next_texture: u32,
    next_framebuffer: u32,
    bound: Option<FramebufferId>,
    pub shade_uniforms: Vec<ShadeUniforms>,
    pub prepare_uniforms: Vec<PrepareUniforms>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.shade_uniforms.clear();
        self.prepare_uniforms.clear();
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(*c)).count()
    }

    pub fn draws(&self, program: Program) -> usize {
        self.count(|c| matches!(c, Command::Draw { program: p, .. } if *p == program))
    }

    fn next_texture(&mut self) -> TextureId {
        self.next_texture += 1;
        TextureId(self.next_texture)
    }
}

impl TerrainBackend for RecordingBackend {
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId {
        let texture = self.next_texture();
        self.commands.push(Command::CreateTexture {
            texture,
            width,
            height,
        });
        texture
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        self.next_framebuffer += 1;
        let framebuffer = FramebufferId(self.next_framebuffer);
        self.commands.push(Command::CreateFramebuffer(framebuffer));
        framebuffer
    }

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.bound = Some(framebuffer);
        self.commands.push(Command::BindFramebuffer(framebuffer));
    }

    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        self.commands.push(Command::AttachColor(framebuffer, texture));
    }

    fn bind_default_framebuffer(&mut self) {
        self.bound = None;
        self.commands.push(Command::BindDefaultFramebuffer);
    }

    fn upload_elevation(&mut self, levels: &[ElevationLevel]) -> TextureId {
        let texture = self.next_texture();
        let sizes = levels.iter().map(|l| (l.width(), l.height())).collect();
        self.commands
            .push(Command::UploadElevation { texture, sizes });
        texture
    }

    fn apply_render_state(&mut self, state: RenderState) {
        self.commands.push(Command::ApplyRenderState(state));
    }

    fn clear(&mut self, color: [f32; 4], depth: f32) {
        self.commands.push(Command::Clear { color, depth });
    }

    fn draw_prepare(&mut self, elevation: TextureId, uniforms: &PrepareUniforms) {
        self.prepare_uniforms.push(*uniforms);
        self.commands.push(Command::Draw {
            program: Program::TerrainPrepare,
            texture: elevation,
            target: self.bound,
            zoom: uniforms.zoom,
        });
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        self.commands.push(Command::GenerateMipmaps(texture));
    }

    fn draw_shade(&mut self, image: TextureId, uniforms: &ShadeUniforms) {
        self.shade_uniforms.push(*uniforms);
        self.commands.push(Command::Draw {
            program: Program::Terrain,
            texture: image,
            target: self.bound,
            zoom: uniforms.zoom,
        });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.commands.push(Command::DeleteTexture(texture));
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.commands.push(Command::DeleteFramebuffer(framebuffer));
    }
}
