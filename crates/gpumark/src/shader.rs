use glow::HasContext;

/// Lines every shader starts with. Valid for desktop GL and GLSL ES 1.00.
pub const SHADER_PRELUDE: &str = "#ifdef GL_ES\nprecision mediump float;\n#endif\n";

/// Compiles and links a program, binding `attribs` to fixed locations.
pub fn create_program(
    gl: &glow::Context,
    vs_src: &str,
    fs_src: &str,
    attribs: &[(u32, &str)],
) -> Result<glow::Program, Box<dyn std::error::Error>> {
    unsafe {
        let program = gl.create_program()?;

        let vs = compile(gl, glow::VERTEX_SHADER, vs_src)
            .map_err(|e| format!("Vertex shader error: {}", e))?;
        let fs = match compile(gl, glow::FRAGMENT_SHADER, fs_src) {
            Ok(fs) => fs,
            Err(e) => {
                gl.delete_shader(vs);
                return Err(format!("Fragment shader error: {}", e).into());
            }
        };

        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        for &(index, name) in attribs {
            gl.bind_attrib_location(program, index, name);
        }

        gl.link_program(program);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(format!("Program link error: {}", log).into());
        }

        Ok(program)
    }
}

unsafe fn compile(gl: &glow::Context, kind: u32, src: &str) -> Result<glow::Shader, String> {
    let shader = gl.create_shader(kind)?;
    gl.shader_source(shader, &format!("{}{}", SHADER_PRELUDE, src));
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(log);
    }
    Ok(shader)
}

pub fn f32_bytes(data: &[f32]) -> &[u8] {
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_bytes_length() {
        let data = [1.0f32, 2.0, 3.0];
        let bytes = f32_bytes(&data);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
    }
}
