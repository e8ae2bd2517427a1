//! GPU context initialization: takes a platform element from bare to render-ready.

use crate::bridge;
use crate::config::CompositorConfig;
use crate::device::{
    GraphicsContext, PlatformSurface, ProgramId, ProgramLayout, ShaderId, ShaderStage, Uniform,
};
use crate::error::{CompositorError, Result};
use crate::math::{look_at, ortho};
use crate::scheduler::FrameGate;
use crate::surface::{GpuResources, Surface, SurfaceHandle};

const VERTEX_SHADER: &str = include_str!("shaders/quad_vs.wgsl");
const FRAGMENT_SHADER: &str = include_str!("shaders/quad_fs.wgsl");

/// Acquires a context for `platform` and builds every per-surface GPU object.
///
/// On failure nothing created here outlives the call.
pub(crate) fn prepare(
    handle: SurfaceHandle,
    platform: Box<dyn PlatformSurface>,
    fps: f64,
    config: &CompositorConfig,
) -> Result<Surface> {
    let element = platform.element_id();
    let Some(mut ctx) = platform.acquire_context() else {
        log::warn!("{element}: platform refused a graphics context");
        return Err(CompositorError::ContextUnavailable(element));
    };
    if ctx.sharing().is_none() {
        log::warn!("{element}: context lacks the texture sharing extension");
        return Err(CompositorError::ContextUnavailable(element));
    }

    let (width, height) = platform.pixel_size();
    ctx.set_viewport(width, height);
    ctx.set_clear_color(config.clear_color);

    let (vertex_shader, fragment_shader, program) = build_program(ctx.as_mut())?;
    upload_camera(ctx.as_mut(), program, width, height, config);

    let positions = ctx.create_buffer(&bridge::model_positions(width, height));
    let uvs = ctx.create_buffer(&bridge::MODEL_UVS);

    let mut surface = Surface {
        handle,
        element,
        platform,
        ctx,
        gpu: GpuResources {
            vertex_shader,
            fragment_shader,
            program,
            positions,
            uvs,
            texture: None,
        },
        width,
        height,
        fps,
        gate: FrameGate::new(fps),
        render_requested: false,
        current_target: None,
    };

    if let Err(e) = surface.recreate_shared_texture(config) {
        surface.release();
        return Err(e);
    }

    log::info!("{handle} ready on {element} ({width}x{height} @ {fps} fps)");
    Ok(surface)
}

fn build_program(ctx: &mut dyn GraphicsContext) -> Result<(ShaderId, ShaderId, ProgramId)> {
    let vs = ctx
        .compile_shader(ShaderStage::Vertex, VERTEX_SHADER)
        .map_err(|log| CompositorError::ShaderCompile {
            stage: ShaderStage::Vertex,
            log,
        })?;

    let fs = match ctx.compile_shader(ShaderStage::Fragment, FRAGMENT_SHADER) {
        Ok(fs) => fs,
        Err(log) => {
            ctx.delete_shader(vs);
            return Err(CompositorError::ShaderCompile {
                stage: ShaderStage::Fragment,
                log,
            });
        }
    };

    match ctx.link_program(vs, fs, &ProgramLayout::QUAD) {
        Ok(program) => Ok((vs, fs, program)),
        Err(log) => {
            ctx.delete_shader(vs);
            ctx.delete_shader(fs);
            Err(CompositorError::ProgramLink { log })
        }
    }
}

/// Uploads an orthographic projection covering `width`x`height` pixels and a
/// view from `eye_distance` units in front of the quad.
pub(crate) fn upload_camera(
    ctx: &mut dyn GraphicsContext,
    program: ProgramId,
    width: u32,
    height: u32,
    config: &CompositorConfig,
) {
    let half_w = width.max(1) as f32 / 2.0;
    let half_h = height.max(1) as f32 / 2.0;

    let projection = ortho(-half_w, half_w, -half_h, half_h, config.near, config.far);
    let view = look_at([0.0, 0.0, config.eye_distance], [0.0; 3], [0.0, 1.0, 0.0]);

    ctx.set_uniform_matrix(program, Uniform::Projection, &projection);
    ctx.set_uniform_matrix(program, Uniform::View, &view);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Call, HeadlessFaults, HeadlessSurface};
    use crate::math::{column_major, matrix_mult, transform_point, ColumnMajor, Mat4};

    fn prepare_headless(surface: &HeadlessSurface) -> Result<Surface> {
        prepare(
            SurfaceHandle(0),
            Box::new(surface.clone()),
            30.0,
            &CompositorConfig::default(),
        )
    }

    fn row_major(m: &ColumnMajor) -> Mat4 {
        let mut out = [[0.0f32; 4]; 4];
        for (row, cells) in out.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                *cell = m[col * 4 + row];
            }
        }
        out
    }

    #[test]
    fn prepare_runs_the_full_sequence() {
        let platform = HeadlessSurface::new(1, 640, 360);
        let surface = prepare_headless(&platform).unwrap();
        assert!(surface.gpu.texture.is_some());

        let calls = platform.log().calls();
        assert_eq!(calls[0], Call::SetViewport { width: 640, height: 360 });
        assert_eq!(calls[1], Call::SetClearColor([0.0, 0.0, 0.0, 1.0]));
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::LinkProgram { layout, .. } if *layout == ProgramLayout::QUAD
        )));

        // Texture is created while sharing is on, committed by one pass, then
        // sharing is switched off again.
        let share_on = calls.iter().position(|c| *c == Call::SetShareNext(true)).unwrap();
        let created = calls
            .iter()
            .position(|c| matches!(c, Call::CreateTexture { shared: true, .. }))
            .unwrap();
        let commit = calls.iter().position(|c| matches!(c, Call::DrawQuad(_))).unwrap();
        let share_off = calls.iter().position(|c| *c == Call::SetShareNext(false)).unwrap();
        assert!(share_on < created && created < commit && commit < share_off);
    }

    #[test]
    fn camera_frames_the_quad() {
        let platform = HeadlessSurface::new(1, 640, 360);
        prepare_headless(&platform).unwrap();

        let uniforms: Vec<(Uniform, ColumnMajor)> = platform
            .log()
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetUniform { uniform, value, .. } => Some((uniform, value)),
                _ => None,
            })
            .collect();
        let projection = uniforms.iter().find(|(u, _)| *u == Uniform::Projection).unwrap().1;
        let view = uniforms.iter().find(|(u, _)| *u == Uniform::View).unwrap().1;
        let mvp = column_major(&matrix_mult(&row_major(&projection), &row_major(&view)));

        let corners = bridge::model_positions(640, 360);
        let bottom_left = transform_point(&mvp, [corners[3], corners[4], corners[5]]);
        let top_right = transform_point(&mvp, [corners[6], corners[7], corners[8]]);
        assert!((bottom_left[0] + 1.0).abs() < 1e-5 && (bottom_left[1] + 1.0).abs() < 1e-5);
        assert!((top_right[0] - 1.0).abs() < 1e-5 && (top_right[1] - 1.0).abs() < 1e-5);
        assert!(bottom_left[2].abs() <= 1.0);
    }

    #[test]
    fn unavailable_context_is_reported() {
        let platform = HeadlessSurface::new(9, 10, 10).with_faults(HeadlessFaults {
            context_unavailable: true,
            ..Default::default()
        });
        let err = prepare_headless(&platform).err().unwrap();
        assert!(matches!(err, CompositorError::ContextUnavailable(e) if e.0 == 9));
        assert!(platform.log().calls().is_empty());
    }

    #[test]
    fn context_without_sharing_is_unavailable() {
        let platform = HeadlessSurface::new(9, 10, 10).with_faults(HeadlessFaults {
            no_sharing: true,
            ..Default::default()
        });
        assert!(matches!(
            prepare_headless(&platform),
            Err(CompositorError::ContextUnavailable(_))
        ));
    }

    #[test]
    fn fragment_failure_releases_vertex_shader() {
        let platform = HeadlessSurface::new(1, 10, 10).with_faults(HeadlessFaults {
            compile: Some(ShaderStage::Fragment),
            ..Default::default()
        });
        let err = prepare_headless(&platform).err().unwrap();
        assert!(matches!(
            err,
            CompositorError::ShaderCompile { stage: ShaderStage::Fragment, .. }
        ));
        assert_eq!(platform.log().count(|c| matches!(c, Call::DeleteShader(_))), 1);
    }

    #[test]
    fn link_failure_carries_log_and_releases_shaders() {
        let platform = HeadlessSurface::new(1, 10, 10).with_faults(HeadlessFaults {
            link: true,
            ..Default::default()
        });
        match prepare_headless(&platform) {
            Err(CompositorError::ProgramLink { log }) => assert!(log.contains("link")),
            other => panic!("expected link failure, got {:?}", other.err()),
        }
        assert_eq!(platform.log().count(|c| matches!(c, Call::DeleteShader(_))), 2);
    }

    #[test]
    fn texture_failure_releases_everything() {
        let platform = HeadlessSurface::new(1, 10, 10).with_faults(HeadlessFaults {
            texture: true,
            ..Default::default()
        });
        assert!(matches!(
            prepare_headless(&platform),
            Err(CompositorError::TextureAllocation(_))
        ));
        let log = platform.log();
        assert_eq!(log.count(|c| matches!(c, Call::DeleteBuffer(_))), 2);
        assert_eq!(log.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
        assert_eq!(log.count(|c| matches!(c, Call::DeleteShader(_))), 2);
        assert_eq!(log.count(|c| *c == Call::SetShareNext(false)), 1);
    }

    #[test]
    fn zero_sized_element_prepares_without_texture() {
        let platform = HeadlessSurface::new(1, 0, 0);
        let surface = prepare_headless(&platform).unwrap();
        assert!(surface.gpu.texture.is_none());
        assert_eq!(platform.log().count(|c| matches!(c, Call::CreateTexture { .. })), 0);
    }
}
