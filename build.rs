use std::fs;
use std::path::Path;

/// 编译期把 migrations/*.sql 嵌入二进制，`blog-server migrate` 按文件名顺序执行
fn main() {
    println!("cargo:rerun-if-changed=migrations/");

    let out_dir = std::env::var("OUT_DIR").expect("OUT_DIR 未设置");
    let dest = Path::new(&out_dir).join("migrations.rs");

    let mut names: Vec<String> = match fs::read_dir("migrations") {
        Ok(dir) => dir
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".sql"))
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();

    let body = names
        .iter()
        .map(|file| {
            format!(
                "    (\"{}\", include_str!(concat!(env!(\"CARGO_MANIFEST_DIR\"), \"/migrations/{}\"))),",
                file.trim_end_matches(".sql"),
                file
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let generated = format!("pub const MIGRATIONS: &[(&str, &str)] = &[\n{}\n];\n", body);
    fs::write(&dest, generated).expect("无法写入 migrations.rs");
}
