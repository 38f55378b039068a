/// Bindings shared by both pipelines (group 0).
const GLOBALS: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    inv_view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    background: vec4<f32>,
    environment: vec4<f32>,
    skybox: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;
@group(0) @binding(1)
var environment_map: texture_cube<f32>;
@group(0) @binding(2)
var background_map: texture_cube<f32>;
@group(0) @binding(3)
var environment_sampler: sampler;

fn linear_to_srgb(color: vec3<f32>) -> vec3<f32> {
    let c = clamp(color, vec3<f32>(0.0), vec3<f32>(1.0));
    let low = c * 12.92;
    let high = 1.055 * pow(c, vec3<f32>(1.0 / 2.4)) - 0.055;
    return select(high, low, c <= vec3<f32>(0.0031308));
}

fn encode_output(color: vec3<f32>) -> vec4<f32> {
    let encoded = select(color, linear_to_srgb(color), globals.environment.z > 0.5);
    return vec4<f32>(encoded, 1.0);
}
"#;

const BACKGROUND: &str = r#"
struct BackgroundOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}

@vertex
fn vs_background(@builtin(vertex_index) index: u32) -> BackgroundOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let ndc = uv * 2.0 - 1.0;
    var out: BackgroundOutput;
    out.position = vec4<f32>(ndc, 1.0, 1.0);
    out.ndc = ndc;
    return out;
}

// Dome of `radius` centred `height` above the ground plane y = 0. Returns the
// lookup direction from the dome centre to where the view ray leaves the
// dome or meets the ground.
fn ground_projected(origin: vec3<f32>, direction: vec3<f32>) -> vec3<f32> {
    let radius = globals.skybox.y;
    let height = globals.skybox.z;
    let ro = origin - vec3<f32>(0.0, height, 0.0);
    let b = dot(ro, direction);
    let c = dot(ro, ro) - radius * radius;
    let disc = b * b - c;
    if (c > 0.0 || disc < 0.0) {
        return direction;
    }
    var t = -b + sqrt(disc);
    if (direction.y < 0.0) {
        let t_ground = (-height - ro.y) / direction.y;
        if (t_ground > 0.0) {
            t = min(t, t_ground);
        }
    }
    return ro + direction * t;
}

@fragment
fn fs_background(in: BackgroundOutput) -> @location(0) vec4<f32> {
    let near = globals.inv_view_proj * vec4<f32>(in.ndc, 0.0, 1.0);
    let far = globals.inv_view_proj * vec4<f32>(in.ndc, 1.0, 1.0);
    var direction = normalize(far.xyz / far.w - near.xyz / near.w);
    if (globals.skybox.x > 0.5) {
        direction = ground_projected(globals.camera_position.xyz, direction);
    }
    let level = globals.background.x * globals.background.z;
    let sampled = textureSampleLevel(background_map, environment_sampler, direction, level).rgb;
    let color = select(vec3<f32>(0.0), sampled * globals.background.y, globals.background.w > 0.5);
    return encode_output(color);
}
"#;

const MESH: &str = r#"
struct MeshUniform {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    base_color: vec4<f32>,
    pbr: vec4<f32>,
}

@group(1) @binding(0)
var<uniform> mesh: MeshUniform;
@group(1) @binding(1)
var base_color_map: texture_2d<f32>;
@group(1) @binding(2)
var metallic_roughness_map: texture_2d<f32>;
@group(1) @binding(3)
var material_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_mesh(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = mesh.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;
    let world_normal = mat3x3<f32>(
        mesh.normal[0].xyz,
        mesh.normal[1].xyz,
        mesh.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);
    out.uv = input.uv;
    return out;
}

@fragment
fn fs_mesh(input: VertexOutput) -> @location(0) vec4<f32> {
    let base = mesh.base_color * textureSample(base_color_map, material_sampler, input.uv);
    let packed = textureSample(metallic_roughness_map, material_sampler, input.uv);
    let metallic = clamp(mesh.pbr.x * packed.b, 0.0, 1.0);
    let roughness = clamp(mesh.pbr.y * packed.g, 0.04, 1.0);

    let n = normalize(input.normal);
    let v = normalize(globals.camera_position.xyz - input.world_pos);
    let n_dot_v = max(dot(n, v), 1e-4);
    let r = reflect(-v, n);

    let max_mip = globals.environment.x;
    let specular_light = textureSampleLevel(environment_map, environment_sampler, r, roughness * max_mip).rgb;
    let diffuse_light = textureSampleLevel(environment_map, environment_sampler, n, max_mip).rgb;

    let f0 = mix(vec3<f32>(0.04), base.rgb, metallic);
    let fresnel = f0 + (max(vec3<f32>(1.0 - roughness), f0) - f0) * pow(1.0 - n_dot_v, 5.0);
    let diffuse = base.rgb * (1.0 - metallic) * diffuse_light;
    let lit = (diffuse + specular_light * fresnel) * mesh.pbr.z * globals.environment.y;

    let color = select(lit, base.rgb, mesh.pbr.w > 0.5);
    return encode_output(color);
}
"#;

pub fn background_source() -> String {
    format!("{GLOBALS}{BACKGROUND}")
}

pub fn mesh_source() -> String {
    format!("{GLOBALS}{MESH}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_declare_their_entry_points() {
        let background = background_source();
        assert!(background.contains("fn vs_background"));
        assert!(background.contains("fn fs_background"));
        let mesh = mesh_source();
        assert!(mesh.contains("fn vs_mesh"));
        assert!(mesh.contains("fn fs_mesh"));
        assert!(mesh.contains("struct Globals"));
    }
}
