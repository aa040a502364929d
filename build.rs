#[cfg(windows)]
fn main() {
    let mut res = winres::WindowsResource::new();

    if std::path::Path::new("icon.ico").exists() {
        res.set_icon("icon.ico");
    }

    let version = env!("CARGO_PKG_VERSION");

    res.set("ProductName", "Receipt Uploader")
        .set(
            "FileDescription",
            "Compresses receipt photos and uploads them to the ledger image store",
        )
        .set("OriginalFilename", "receipt-uploader.exe")
        .set("FileVersion", version)
        .set("ProductVersion", version);

    if let Err(e) = res.compile() {
        eprintln!("Warning: Failed to set Windows resource metadata: {}", e);
    }
}

#[cfg(not(windows))]
fn main() {}
