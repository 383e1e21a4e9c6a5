fn main() {
    slint_build::compile("src/ui.slint").unwrap();

    #[cfg(windows)]
    {
        let icon = std::path::Path::new("../../assets/icon.ico");
        if icon.exists() {
            let mut res = winres::WindowsResource::new();
            res.set_icon(&icon.to_string_lossy());
            res.compile().unwrap();
        }
    }
}
