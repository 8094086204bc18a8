//! WGSL sources for the terrain programs and the mip chain blit.
//!
//! Uniform struct layouts match [`crate::uniforms`].

/// `terrainPrepare`: decodes terrain-RGB elevation around each texel and
/// writes the Sobel derivative, biased into `[0, 1]`, to RG.
pub const TERRAIN_PREPARE_SHADER_SOURCE: &str = r#"
struct PrepareUniforms {
    // `matrix` is a reserved word in WGSL.
    u_matrix: mat4x4<f32>,
    dimension: vec2<f32>,
    zoom: f32,
    _pad: f32,
};

@group(0) @binding(0) var<uniform> u: PrepareUniforms;
@group(0) @binding(1) var u_image: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) pos: vec2<f32>,
};

@vertex
fn vs_main(@location(0) a_pos: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = u.u_matrix * vec4<f32>(a_pos, 0.0, 1.0);
    out.pos = a_pos;
    return out;
}

fn elevation(p: vec2<i32>) -> f32 {
    let dims = vec2<i32>(textureDimensions(u_image, 0));
    let texel = clamp(p, vec2<i32>(0), dims - vec2<i32>(1));
    let rgb = textureLoad(u_image, texel, 0).rgb * 255.0;
    return -10000.0 + (rgb.r * 65536.0 + rgb.g * 256.0 + rgb.b) * 0.1;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let p = vec2<i32>(floor(in.pos * u.dimension));

    let a = elevation(p + vec2<i32>(-1, -1));
    let b = elevation(p + vec2<i32>(0, -1));
    let c = elevation(p + vec2<i32>(1, -1));
    let d = elevation(p + vec2<i32>(-1, 0));
    let f = elevation(p + vec2<i32>(1, 0));
    let g = elevation(p + vec2<i32>(-1, 1));
    let h = elevation(p + vec2<i32>(0, 1));
    let i = elevation(p + vec2<i32>(1, 1));

    // Low zooms cover more ground per texel, so flatten them less.
    var boost = 0.3;
    if (u.zoom < 2.0) {
        boost = 0.4;
    } else if (u.zoom < 4.5) {
        boost = 0.35;
    }

    let deriv = vec2<f32>(
        (c + f + f + i) - (a + d + d + g),
        (g + h + h + i) - (a + b + b + c),
    ) / pow(2.0, boost + (19.2562 - u.zoom));

    return clamp(vec4<f32>(deriv * 0.5 + 0.5, 1.0, 1.0), vec4<f32>(0.0), vec4<f32>(1.0));
}
"#;

/// `terrain`: hillshades the prepared derivative image.
pub const TERRAIN_SHADER_SOURCE: &str = r#"
struct ShadeUniforms {
    u_matrix: mat4x4<f32>,
    shadow: vec4<f32>,
    highlight: vec4<f32>,
    accent: vec4<f32>,
    dimension: vec2<f32>,
    zoom: f32,
    azimuth: f32,
    zenith: f32,
    exaggeration: f32,
    mipmap: f32,
    _pad: f32,
};

@group(0) @binding(0) var<uniform> u: ShadeUniforms;
@group(0) @binding(1) var u_image: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

const PI: f32 = 3.141592653589793;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) a_pos: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = u.u_matrix * vec4<f32>(a_pos, 0.0, 1.0);
    // The prepare pass wrote the tile upside down.
    out.uv = vec2<f32>(a_pos.x, 1.0 - a_pos.y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let pixel = textureSampleLevel(u_image, u_sampler, in.uv, u.mipmap);
    let deriv = pixel.rg * 2.0 - 1.0;

    let slope = atan(1.25 * length(deriv));
    var aspect = PI / 2.0 * select(-1.0, 1.0, deriv.y > 0.0);
    if (deriv.x != 0.0) {
        aspect = atan2(deriv.y, -deriv.x);
    }

    let intensity = clamp(u.exaggeration, 0.0, 1.0);
    let base = 1.875 - intensity * 1.75;
    let max_slope = 0.5 * PI;
    var scaled_slope = slope;
    if (intensity != 0.5) {
        scaled_slope = ((pow(base, slope) - 1.0) / (pow(base, max_slope) - 1.0)) * max_slope;
    }

    let lit = clamp(
        cos(u.zenith) * cos(scaled_slope)
            + sin(u.zenith) * sin(scaled_slope) * cos(u.azimuth - aspect),
        0.0,
        1.0,
    );
    let strength = clamp(intensity * 2.0, 0.0, 1.0);

    let accent = u.accent * (1.0 - cos(scaled_slope)) * strength;
    let shade = mix(u.shadow, u.highlight, lit) * sin(scaled_slope) * strength;
    return accent * (1.0 - shade.a) + shade;
}
"#;

/// Downsamples one mip level into the next with a full-screen triangle.
pub const MIPMAP_BLIT_SHADER_SOURCE: &str = r#"
@group(0) @binding(0) var src_texture: texture_2d<f32>;
@group(0) @binding(1) var src_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(src_texture, src_sampler, in.uv);
}
"#;
