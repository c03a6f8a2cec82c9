/// Output file name derived from a user supplied base name.
///
/// Everything but ASCII letters and digits is dropped; an empty result becomes `render`.
pub fn output_file_name(base: &str) -> String {
    let stem: String = base.chars().filter(char::is_ascii_alphanumeric).collect();
    let stem = if stem.is_empty() { "render" } else { stem.as_str() };
    format!("{stem}.mp4")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_and_falls_back() {
        assert_eq!(output_file_name("My Mix #3 (final)"), "MyMix3final.mp4");
        assert_eq!(output_file_name("  ../..  "), "render.mp4");
        assert_eq!(output_file_name(""), "render.mp4");
        assert_eq!(output_file_name("café"), "caf.mp4");
    }
}
