use std::collections::HashSet;

/// GL capabilities resolved once after the first context became current.
/// Read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ExtensionTable {
    names: HashSet<String>,
    pub depth24: bool,
    pub depth32: bool,
    pub rgba8: bool,
    pub rgb8: bool,
}

impl ExtensionTable {
    pub fn new<I, S>(names: I, desktop_gl: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        let has = |n: &str| names.contains(n);

        Self {
            depth24: desktop_gl || has("GL_OES_depth24"),
            depth32: desktop_gl || has("GL_OES_depth32"),
            rgba8: desktop_gl || has("GL_OES_rgb8_rgba8") || has("GL_ARM_rgba8"),
            // GL_ARM_rgba8 only covers the 4-channel format.
            rgb8: desktop_gl || has("GL_OES_rgb8_rgba8"),
            names,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Splits a space-separated extension string as returned by
/// `eglQueryString`/`glXQueryExtensionsString`.
pub fn split_extension_string(s: &str) -> impl Iterator<Item = &str> {
    s.split_ascii_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gles_extensions() {
        let table = ExtensionTable::new(["GL_OES_depth24", "GL_OES_rgb8_rgba8", "GL_EXT_discard_framebuffer"], false);
        assert!(table.depth24);
        assert!(!table.depth32);
        assert!(table.rgba8);
        assert!(table.rgb8);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_arm_rgba8_has_no_rgb8() {
        let table = ExtensionTable::new(["GL_ARM_rgba8"], false);
        assert!(table.rgba8);
        assert!(!table.rgb8);
    }

    #[test]
    fn test_desktop_gl_implies_core_formats() {
        let table = ExtensionTable::new(Vec::<String>::new(), true);
        assert!(table.depth24 && table.depth32 && table.rgba8 && table.rgb8);
        assert!(table.is_empty());
    }

    #[test]
    fn test_split_extension_string() {
        let names: Vec<_> = split_extension_string("EGL_KHR_a  EGL_MESA_b\n").collect();
        assert_eq!(names, vec!["EGL_KHR_a", "EGL_MESA_b"]);
    }
}
