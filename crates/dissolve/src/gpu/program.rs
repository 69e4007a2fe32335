use std::borrow::Cow;

use wgpu::naga::ShaderStage as NagaStage;
use wgpu::util::DeviceExt;

use crate::error::{DissolveError, ShaderStage};
use crate::texture::GpuTexture;

use super::uniforms::DissolveUniforms;

pub(crate) const UNIFORM_BINDING: u32 = 0;
pub(crate) const MEDIA_TEXTURE_BINDING: u32 = 0;
pub(crate) const MEDIA_SAMPLER_BINDING: u32 = 1;
pub(crate) const MASK_TEXTURE_BINDING: u32 = 2;
pub(crate) const MASK_SAMPLER_BINDING: u32 = 3;

const VERTEX_COUNT: u32 = 6;

/// Two triangles covering clip space.
const POSITIONS: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

const UVS: [[f32; 2]; 6] = [
    [0.0, 0.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [1.0, 0.0],
    [1.0, 1.0],
    [0.0, 1.0],
];

/// Maps the quad onto UV space, letterboxing the axis `uvScale` shrinks.
///
/// The uniform block layout must match [`DissolveUniforms`].
pub(crate) const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 position;
layout(location = 1) in vec2 uv;
layout(location = 0) out vec2 v_uv;

layout(std140, set = 0, binding = 0) uniform DissolveParams {
    vec2 uvScale;
    float progress;
    float dissolveLowEdge;
    float dissolveHighEdge;
} params;

void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    v_uv = uv;
    if (params.uvScale.y < 1.0) {
        float offset = (1.0 - params.uvScale.y) * 0.5;
        v_uv.y = v_uv.y * params.uvScale.y + offset;
    } else {
        float offset = (1.0 - params.uvScale.x) * 0.5;
        v_uv.x = v_uv.x * params.uvScale.x + offset;
    }
}
";

/// Reveals the media where the mask's red channel has been overtaken by progress.
pub(crate) const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform DissolveParams {
    vec2 uvScale;
    float progress;
    float dissolveLowEdge;
    float dissolveHighEdge;
} params;

layout(set = 1, binding = 0) uniform texture2D media_texture;
layout(set = 1, binding = 1) uniform sampler media_sampler;
layout(set = 1, binding = 2) uniform texture2D mask_texture;
layout(set = 1, binding = 3) uniform sampler mask_sampler;

void main() {
    vec4 color = texture(sampler2D(media_texture, media_sampler), v_uv);
    float mask = texture(sampler2D(mask_texture, mask_sampler), v_uv).r;
    float cutoff = clamp(mask - 1.0 + params.progress, 0.0, 1.0);
    float alpha = smoothstep(params.dissolveLowEdge, params.dissolveHighEdge, cutoff);
    outColor = vec4(color.rgb, color.a * alpha);
}
";

/// Binding layouts resolved once when the program is linked.
pub(crate) struct ProgramBindings {
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
}

impl ProgramBindings {
    fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("dissolve uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: UNIFORM_BINDING,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("dissolve texture layout"),
            entries: &[
                texture_entry(MEDIA_TEXTURE_BINDING),
                sampler_entry(MEDIA_SAMPLER_BINDING),
                texture_entry(MASK_TEXTURE_BINDING),
                sampler_entry(MASK_SAMPLER_BINDING),
            ],
        });

        Self {
            uniform_layout,
            texture_layout,
        }
    }

    pub fn uniform_layout(&self) -> &wgpu::BindGroupLayout {
        &self.uniform_layout
    }

    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_layout
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Compiled dissolve shaders, pipeline and the static geometry they draw.
pub(crate) struct DissolveProgram {
    bindings: ProgramBindings,
    _vertex_module: wgpu::ShaderModule,
    _fragment_module: wgpu::ShaderModule,
    pipeline: wgpu::RenderPipeline,
    position_buffer: wgpu::Buffer,
    uv_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

impl DissolveProgram {
    pub fn new(
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
        uniforms: &DissolveUniforms,
    ) -> Result<Self, DissolveError> {
        let vertex_module = compile_stage(device, ShaderStage::Vertex, VERTEX_SHADER_GLSL)?;
        let fragment_module = compile_stage(device, ShaderStage::Fragment, FRAGMENT_SHADER_GLSL)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bindings = ProgramBindings::new(device);

        let position_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dissolve positions"),
            contents: bytemuck::cast_slice(&POSITIONS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let uv_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dissolve uvs"),
            contents: bytemuck::cast_slice(&UVS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("dissolve uniforms"),
            contents: bytemuck::bytes_of(uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dissolve uniform bind group"),
            layout: bindings.uniform_layout(),
            entries: &[wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("dissolve pipeline layout"),
            bind_group_layouts: &[bindings.uniform_layout(), bindings.texture_layout()],
            push_constant_ranges: &[],
        });

        let vertex_layouts = [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![0 => Float32x2],
            },
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![1 => Float32x2],
            },
        ];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("dissolve pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &vertex_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::SrcAlpha,
                            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                            operation: wgpu::BlendOperation::Add,
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::One,
                            dst_factor: wgpu::BlendFactor::Zero,
                            operation: wgpu::BlendOperation::Add,
                        },
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(DissolveError::ProgramLink(err.to_string()));
        }
        tracing::debug!(?target_format, "linked dissolve program");

        Ok(Self {
            bindings,
            _vertex_module: vertex_module,
            _fragment_module: fragment_module,
            pipeline,
            position_buffer,
            uv_buffer,
            uniform_buffer,
            uniform_bind_group,
        })
    }

    pub fn bindings(&self) -> &ProgramBindings {
        &self.bindings
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &DissolveUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        media: &GpuTexture,
        mask: &GpuTexture,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dissolve texture bind group"),
            layout: self.bindings.texture_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: MEDIA_TEXTURE_BINDING,
                    resource: wgpu::BindingResource::TextureView(&media.view),
                },
                wgpu::BindGroupEntry {
                    binding: MEDIA_SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&media.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: MASK_TEXTURE_BINDING,
                    resource: wgpu::BindingResource::TextureView(&mask.view),
                },
                wgpu::BindGroupEntry {
                    binding: MASK_SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&mask.sampler),
                },
            ],
        })
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, textures: &wgpu::BindGroup) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, textures, &[]);
        pass.set_vertex_buffer(0, self.position_buffer.slice(..));
        pass.set_vertex_buffer(1, self.uv_buffer.slice(..));
        pass.draw(0..VERTEX_COUNT, 0..1);
    }

    /// Frees the buffers immediately; modules and pipeline go with `self`.
    pub fn destroy(self) {
        self.position_buffer.destroy();
        self.uv_buffer.destroy();
        self.uniform_buffer.destroy();
    }
}

fn compile_stage(
    device: &wgpu::Device,
    stage: ShaderStage,
    source: &'static str,
) -> Result<wgpu::ShaderModule, DissolveError> {
    let naga_stage = match stage {
        ShaderStage::Vertex => NagaStage::Vertex,
        ShaderStage::Fragment => NagaStage::Fragment,
    };
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(match stage {
            ShaderStage::Vertex => "dissolve vertex",
            ShaderStage::Fragment => "dissolve fragment",
        }),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage: naga_stage,
            defines: &[],
        },
    });
    match pollster::block_on(device.pop_error_scope()) {
        Some(err) => Err(DissolveError::ShaderCompile {
            stage,
            message: err.to_string(),
        }),
        None => Ok(module),
    }
}

#[cfg(test)]
mod tests {
    use wgpu::naga::front::glsl::{Frontend, Options};
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    use super::*;

    fn validate(stage: NagaStage, source: &str) -> wgpu::naga::Module {
        let module = Frontend::default()
            .parse(&Options::from(stage), source)
            .unwrap_or_else(|err| panic!("{stage:?} shader failed to parse: {err:?}"));
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|err| panic!("{stage:?} shader failed validation: {err:?}"));
        module
    }

    #[test]
    fn vertex_shader_is_valid_glsl() {
        let module = validate(NagaStage::Vertex, VERTEX_SHADER_GLSL);
        assert_eq!(module.entry_points.len(), 1);
    }

    #[test]
    fn fragment_shader_is_valid_glsl() {
        let module = validate(NagaStage::Fragment, FRAGMENT_SHADER_GLSL);
        assert_eq!(module.entry_points.len(), 1);
    }

    #[test]
    fn quad_covers_unit_uv_square() {
        assert_eq!(POSITIONS.len() as u32, VERTEX_COUNT);
        assert_eq!(UVS.len(), POSITIONS.len());
        for (position, uv) in POSITIONS.iter().zip(UVS.iter()) {
            assert_eq!(position[0] * 0.5 + 0.5, uv[0]);
            assert_eq!(position[1] * 0.5 + 0.5, uv[1]);
        }
    }
}
