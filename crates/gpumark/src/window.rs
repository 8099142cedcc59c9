/// Native window request, and once a window exists, the geometry the
/// window system actually granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowProperties {
    pub width: i32,
    pub height: i32,
    pub fullscreen: bool,
    /// Platform pixel-format id (X visual, EGL native visual, GBM format).
    pub visual_id: i64,
}

impl Default for WindowProperties {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            fullscreen: false,
            visual_id: 0,
        }
    }
}

impl WindowProperties {
    pub fn new(width: i32, height: i32, fullscreen: bool, visual_id: i64) -> Self {
        Self {
            width,
            height,
            fullscreen,
            visual_id,
        }
    }

    pub fn has_valid_size(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Parses `WxH`. `-1x-1` is accepted and means fullscreen.
    pub fn parse_size(s: &str) -> Option<(i32, i32)> {
        let (w, h) = s.trim().split_once('x')?;
        let w = w.trim().parse::<i32>().ok()?;
        let h = h.trim().parse::<i32>().ok()?;
        if (w > 0 && h > 0) || (w == -1 && h == -1) {
            Some((w, h))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(WindowProperties::parse_size("800x600"), Some((800, 600)));
        assert_eq!(WindowProperties::parse_size(" 1920x1080 "), Some((1920, 1080)));
        assert_eq!(WindowProperties::parse_size("-1x-1"), Some((-1, -1)));
        assert_eq!(WindowProperties::parse_size("800"), None);
        assert_eq!(WindowProperties::parse_size("0x600"), None);
        assert_eq!(WindowProperties::parse_size("axb"), None);
    }

    #[test]
    fn test_valid_size() {
        assert!(WindowProperties::default().has_valid_size());
        assert!(!WindowProperties::new(0, 10, false, 0).has_valid_size());
    }
}
