use std::{env, path::Path};

/**
 * Help tests find their fixture files.
 *
 * If we invoke tests via 'cargo test', the base dir is the crate dir
 * (e.g., split-stats/libsplitstats) but if we start it from the IDE,
 * it's the workspace root.
 */
pub fn test_dir(base: &str, f: &str) -> String {
    use std::fs::metadata;
    if metadata(f).is_ok() {
        return f.to_string();
    }
    let p = Path::new(base).join(f);
    if metadata(&p).is_ok() {
        p.to_string_lossy().to_string()
    } else {
        let cwd = env::current_dir().unwrap();
        panic!(
            "Couldn't find a test_dir for {} from cwd={}",
            f,
            cwd.display()
        );
    }
}
