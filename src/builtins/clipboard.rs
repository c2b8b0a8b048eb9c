// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 convpipe contributors

//! Clipboard builtin
//!
//! As a stage, copies the incoming file to the system clipboard and hands
//! the same file to the next stage. Copy failures are reported on the
//! outcome but never stop the pipeline. As a source, materializes the
//! clipboard content into a file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{ConvpipeError, ConvpipeResult};
use crate::pipeline::ValidationResult;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];

const TEXT_EXTENSIONS: [&str; 10] = [
    "txt", "md", "json", "xml", "csv", "html", "htm", "yaml", "yml", "log",
];

/// How a file is placed on the clipboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Image data
    Image,
    /// File contents as text
    Text,
    /// Anything else; the absolute path is copied as text
    Other,
}

impl ContentKind {
    /// Classify a file by extension
    pub fn from_path(path: &Path) -> Self {
        let ext = Self::extension(path);

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Self::Text
        } else {
            Self::Other
        }
    }

    fn extension(path: &Path) -> String {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Raw content read from the clipboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardContent {
    pub data: Vec<u8>,
    /// File extension for the data ("png", "txt")
    pub format: String,
}

/// Platform clipboard access
pub trait ClipboardBackend: Send + Sync {
    /// Place text on the clipboard
    fn write_text(&self, text: &str) -> ConvpipeResult<()>;

    /// Place an image file on the clipboard
    fn write_image(&self, image: &Path) -> ConvpipeResult<()>;

    /// Read image data, `None` when the clipboard holds no image
    fn read_image(&self) -> ConvpipeResult<Option<ClipboardContent>>;

    /// Read text, `None` when the clipboard holds no text
    fn read_text(&self) -> ConvpipeResult<Option<ClipboardContent>>;
}

/// Outcome of copying a file to the clipboard
#[derive(Debug, Clone)]
pub struct ClipboardOutcome {
    /// Always the input path
    pub output: PathBuf,
    pub kind: ContentKind,
    pub copied: bool,
    pub error: Option<String>,
}

/// A clipboard read materialized into a file
#[derive(Debug, Clone)]
pub struct ClipboardRead {
    pub file: PathBuf,
    pub detected_format: String,
}

/// Clipboard builtin
#[derive(Clone)]
pub struct Clipboard {
    backend: Arc<dyn ClipboardBackend>,
}

impl Clipboard {
    /// Create a clipboard builtin over the given backend
    pub fn new(backend: Arc<dyn ClipboardBackend>) -> Self {
        Self { backend }
    }

    /// Clipboard builtin backed by the platform's clipboard tools
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClipboard))
    }

    /// Copy `input` to the clipboard, passing it through unchanged
    ///
    /// Only a missing input is an error; clipboard failures are recorded
    /// on the outcome.
    pub fn execute(&self, input: &Path) -> ConvpipeResult<ClipboardOutcome> {
        if !input.exists() {
            return Err(ConvpipeError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        let kind = ContentKind::from_path(input);
        let copy_result = match kind {
            ContentKind::Image => self.backend.write_image(input),
            ContentKind::Text => std::fs::read_to_string(input)
                .map_err(ConvpipeError::from)
                .and_then(|text| self.backend.write_text(&text)),
            ContentKind::Other => self.copy_path(input),
        };

        let error = match copy_result {
            Ok(()) => {
                debug!(input = %input.display(), ?kind, "copied to clipboard");
                None
            }
            Err(e) => {
                warn!(input = %input.display(), "clipboard copy failed: {}", e);
                Some(e.to_string())
            }
        };

        Ok(ClipboardOutcome {
            output: input.to_path_buf(),
            kind,
            copied: error.is_none(),
            error,
        })
    }

    /// Copy the absolute path of a file as text
    pub fn copy_path(&self, path: &Path) -> ConvpipeResult<()> {
        let absolute = std::path::absolute(path)?;
        self.backend.write_text(&absolute.to_string_lossy())
    }

    /// Read the clipboard into `temp_dir/clipboard.<format>`
    ///
    /// `format_hint` restricts the read to images (an image extension) or
    /// text (anything else); without a hint images are tried first.
    pub fn read_to_file(
        &self,
        temp_dir: &Path,
        format_hint: Option<&str>,
    ) -> ConvpipeResult<ClipboardRead> {
        let wants_image = format_hint.map(|hint| {
            IMAGE_EXTENSIONS.contains(&hint.trim_start_matches('.').to_lowercase().as_str())
        });

        let content = match wants_image {
            Some(true) => self.backend.read_image()?,
            Some(false) => self.backend.read_text()?,
            None => match self.backend.read_image()? {
                Some(image) => Some(image),
                None => self.backend.read_text()?,
            },
        };

        let content = content
            .filter(|c| !c.data.is_empty())
            .ok_or_else(|| ConvpipeError::Clipboard {
                message: "Clipboard is empty or holds no supported content".into(),
            })?;

        std::fs::create_dir_all(temp_dir)?;
        let file = temp_dir.join(format!("clipboard.{}", content.format));
        std::fs::write(&file, &content.data)?;

        Ok(ClipboardRead {
            file,
            detected_format: content.format,
        })
    }

    /// Clipboard may sit at any stage; it always has an upstream input
    pub fn validate(_current_stage_index: usize) -> ValidationResult {
        ValidationResult::new()
    }

    /// Check if a target name is the clipboard builtin
    pub fn is_clipboard(target: &str) -> bool {
        target.eq_ignore_ascii_case("clipboard")
    }
}

impl std::fmt::Debug for Clipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clipboard").finish_non_exhaustive()
    }
}

/// Clipboard access through the platform's command-line tools
pub struct SystemClipboard;

impl SystemClipboard {
    fn has_display() -> bool {
        std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
    }

    fn is_wayland() -> bool {
        std::env::var_os("WAYLAND_DISPLAY").is_some()
    }

    /// PowerShell saves the clipboard image to a scratch PNG we read back
    fn read_windows_image() -> ConvpipeResult<Option<Vec<u8>>> {
        let scratch_dir = tempfile::Builder::new().prefix("convpipe-clipboard-").tempdir()?;
        let scratch = scratch_dir.path().join("clipboard.png");
        let script = save_image_script(&scratch);

        if !pipe_to("powershell", &["-NoProfile", "-Command", &script], &[]) {
            return Ok(None);
        }
        if !scratch.is_file() {
            return Ok(None);
        }
        let data = std::fs::read(&scratch)?;
        Ok((!data.is_empty()).then_some(data))
    }

    fn require_display() -> ConvpipeResult<()> {
        if Self::has_display() {
            Ok(())
        } else {
            Err(ConvpipeError::Clipboard {
                message: "No display available (DISPLAY or WAYLAND_DISPLAY not set)".into(),
            })
        }
    }

    fn mime_type(image: &Path) -> &'static str {
        match ContentKind::extension(image).as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "webp" => "image/webp",
            "tiff" => "image/tiff",
            _ => "image/png",
        }
    }
}

/// PowerShell that writes the clipboard image, if any, to `path` as PNG
fn save_image_script(path: &Path) -> String {
    format!(
        "Add-Type -AssemblyName System.Windows.Forms; \
         $img = Get-Clipboard -Format Image; \
         if ($img) {{ $img.Save('{}', [System.Drawing.Imaging.ImageFormat]::Png) }}",
        path.display().to_string().replace('\'', "''")
    )
}

/// Run `program` feeding `input` on stdin; false if missing or failing
fn pipe_to(program: &str, args: &[&str], input: &[u8]) -> bool {
    if which::which(program).is_err() {
        return false;
    }

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    let Ok(mut child) = child else {
        return false;
    };

    if let Some(mut stdin) = child.stdin.take() {
        if stdin.write_all(input).is_err() {
            let _ = child.kill();
            return false;
        }
    }

    child.wait().map(|status| status.success()).unwrap_or(false)
}

/// Run `program` and capture stdout; `None` if missing, failing or empty
fn capture(program: &str, args: &[&str]) -> Option<Vec<u8>> {
    which::which(program).ok()?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;

    (output.status.success() && !output.stdout.is_empty()).then_some(output.stdout)
}

impl ClipboardBackend for SystemClipboard {
    fn write_text(&self, text: &str) -> ConvpipeResult<()> {
        let bytes = text.as_bytes();

        let copied = if cfg!(target_os = "macos") {
            pipe_to("pbcopy", &[], bytes)
        } else if cfg!(target_os = "windows") {
            pipe_to(
                "powershell",
                &["-NoProfile", "-Command", "$input | Set-Clipboard"],
                bytes,
            )
        } else {
            Self::require_display()?;
            pipe_to("xclip", &["-selection", "clipboard"], bytes)
                || pipe_to("xsel", &["--clipboard", "--input"], bytes)
                || (Self::is_wayland() && pipe_to("wl-copy", &[], bytes))
        };

        if copied {
            Ok(())
        } else {
            Err(ConvpipeError::Clipboard {
                message: "Failed to copy text to clipboard (no working clipboard tool)".into(),
            })
        }
    }

    fn write_image(&self, image: &Path) -> ConvpipeResult<()> {
        let absolute = std::path::absolute(image)?;
        let absolute_str = absolute.to_string_lossy().into_owned();

        let copied = if cfg!(target_os = "macos") {
            let script = format!(
                "ObjC.import(\"Cocoa\"); \
                 var image = $.NSImage.alloc.initWithContentsOfFile({:?}); \
                 if (image.isNil()) {{ throw new Error(\"unreadable image\"); }} \
                 var pb = $.NSPasteboard.generalPasteboard; \
                 pb.clearContents; \
                 pb.writeObjects($.NSArray.arrayWithObject(image));",
                absolute_str
            );
            let ok = pipe_to("osascript", &["-l", "JavaScript", "-e", &script], &[]);
            // Fall back to the path so the user still gets something useful
            ok || self.write_text(&absolute_str).is_ok()
        } else if cfg!(target_os = "windows") {
            let script = format!(
                "Add-Type -AssemblyName System.Windows.Forms; \
                 [System.Windows.Forms.Clipboard]::SetImage([System.Drawing.Image]::FromFile('{}'))",
                absolute_str.replace('\'', "''")
            );
            pipe_to("powershell", &["-NoProfile", "-Command", &script], &[])
        } else {
            Self::require_display()?;
            let mime = Self::mime_type(image);
            let data = std::fs::read(image)?;
            pipe_to("xclip", &["-selection", "clipboard", "-t", mime], &data)
                || (Self::is_wayland() && pipe_to("wl-copy", &["--type", mime], &data))
        };

        if copied {
            Ok(())
        } else {
            Err(ConvpipeError::Clipboard {
                message: "Failed to copy image to clipboard (no working clipboard tool)".into(),
            })
        }
    }

    fn read_image(&self) -> ConvpipeResult<Option<ClipboardContent>> {
        let data = if cfg!(target_os = "macos") {
            capture("pngpaste", &["-"])
        } else if cfg!(target_os = "windows") {
            Self::read_windows_image()?
        } else {
            Self::require_display()?;
            capture("xclip", &["-selection", "clipboard", "-t", "image/png", "-o"]).or_else(|| {
                Self::is_wayland()
                    .then(|| capture("wl-paste", &["--type", "image/png"]))
                    .flatten()
            })
        };

        Ok(data.map(|data| ClipboardContent {
            data,
            format: "png".into(),
        }))
    }

    fn read_text(&self) -> ConvpipeResult<Option<ClipboardContent>> {
        let data = if cfg!(target_os = "macos") {
            capture("pbpaste", &[])
        } else if cfg!(target_os = "windows") {
            capture("powershell", &["-NoProfile", "-Command", "Get-Clipboard -Raw"])
        } else {
            Self::require_display()?;
            capture("xclip", &["-selection", "clipboard", "-o"])
                .or_else(|| capture("xsel", &["--clipboard", "--output"]))
                .or_else(|| {
                    Self::is_wayland()
                        .then(|| capture("wl-paste", &["--no-newline"]))
                        .flatten()
                })
        };

        Ok(data.map(|data| ClipboardContent {
            data,
            format: "txt".into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory backend recording what was written
    #[derive(Default)]
    struct MemoryClipboard {
        written: Mutex<Vec<String>>,
        image: Option<Vec<u8>>,
        text: Option<String>,
        fail_writes: bool,
    }

    impl ClipboardBackend for MemoryClipboard {
        fn write_text(&self, text: &str) -> ConvpipeResult<()> {
            if self.fail_writes {
                return Err(ConvpipeError::Clipboard {
                    message: "no clipboard".into(),
                });
            }
            self.written.lock().unwrap().push(format!("text:{text}"));
            Ok(())
        }

        fn write_image(&self, image: &Path) -> ConvpipeResult<()> {
            if self.fail_writes {
                return Err(ConvpipeError::Clipboard {
                    message: "no clipboard".into(),
                });
            }
            self.written
                .lock()
                .unwrap()
                .push(format!("image:{}", image.display()));
            Ok(())
        }

        fn read_image(&self) -> ConvpipeResult<Option<ClipboardContent>> {
            Ok(self.image.clone().map(|data| ClipboardContent {
                data,
                format: "png".into(),
            }))
        }

        fn read_text(&self) -> ConvpipeResult<Option<ClipboardContent>> {
            Ok(self.text.clone().map(|t| ClipboardContent {
                data: t.into_bytes(),
                format: "txt".into(),
            }))
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_is_clipboard_case_insensitive() {
        assert!(Clipboard::is_clipboard("clipboard"));
        assert!(Clipboard::is_clipboard("Clipboard"));
        assert!(Clipboard::is_clipboard("CLIPBOARD"));
        assert!(Clipboard::is_clipboard("ClipBoard"));

        assert!(!Clipboard::is_clipboard("clip"));
        assert!(!Clipboard::is_clipboard("copy"));
        assert!(!Clipboard::is_clipboard("tee"));
        assert!(!Clipboard::is_clipboard(""));
    }

    #[test]
    fn test_validate_succeeds_for_any_stage() {
        assert!(Clipboard::validate(0).is_valid());
        assert!(Clipboard::validate(1).is_valid());
        assert!(Clipboard::validate(5).is_valid());
    }

    #[test]
    fn test_content_kind() {
        assert_eq!(ContentKind::from_path(Path::new("a.PNG")), ContentKind::Image);
        assert_eq!(ContentKind::from_path(Path::new("a.yml")), ContentKind::Text);
        assert_eq!(ContentKind::from_path(Path::new("a.pdf")), ContentKind::Other);
        assert_eq!(ContentKind::from_path(Path::new("noext")), ContentKind::Other);
    }

    #[test]
    fn test_execute_nonexistent_file() {
        let clipboard = Clipboard::new(Arc::new(MemoryClipboard::default()));
        let err = clipboard
            .execute(Path::new("/nonexistent/path/file.txt"))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_execute_copies_by_kind() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MemoryClipboard::default());
        let clipboard = Clipboard::new(backend.clone());

        let text = write(tmp.path(), "notes.txt", "hello world");
        let image = write(tmp.path(), "shot.png", "png-bytes");
        let other = write(tmp.path(), "report.pdf", "pdf");

        assert!(clipboard.execute(&text).unwrap().copied);
        assert!(clipboard.execute(&image).unwrap().copied);
        assert!(clipboard.execute(&other).unwrap().copied);

        let written = backend.written.lock().unwrap();
        assert_eq!(written[0], "text:hello world");
        assert!(written[1].starts_with("image:"));
        assert!(written[2].starts_with("text:"));
        assert!(written[2].ends_with("report.pdf"));
    }

    #[test]
    fn test_execute_passes_through_on_failure() {
        let tmp = TempDir::new().unwrap();
        let clipboard = Clipboard::new(Arc::new(MemoryClipboard {
            fail_writes: true,
            ..Default::default()
        }));
        let file = write(tmp.path(), "test.txt", "hello");

        let outcome = clipboard.execute(&file).unwrap();
        assert_eq!(outcome.output, file);
        assert!(!outcome.copied);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_read_prefers_image() {
        let tmp = TempDir::new().unwrap();
        let clipboard = Clipboard::new(Arc::new(MemoryClipboard {
            image: Some(vec![0x89, b'P', b'N', b'G']),
            text: Some("ignored".into()),
            ..Default::default()
        }));

        let read = clipboard.read_to_file(tmp.path(), None).unwrap();
        assert_eq!(read.detected_format, "png");
        assert_eq!(read.file, tmp.path().join("clipboard.png"));

        let text_read = clipboard.read_to_file(tmp.path(), Some("txt")).unwrap();
        assert_eq!(text_read.detected_format, "txt");
        assert_eq!(std::fs::read_to_string(text_read.file).unwrap(), "ignored");
    }

    #[test]
    fn test_read_empty_clipboard_fails() {
        let tmp = TempDir::new().unwrap();
        let clipboard = Clipboard::new(Arc::new(MemoryClipboard::default()));
        assert!(clipboard.read_to_file(tmp.path(), None).is_err());
    }

    #[test]
    fn test_save_image_script_quotes_path() {
        let script = save_image_script(Path::new("C:/Users/o'neil/clip.png"));
        assert!(script.contains("Get-Clipboard -Format Image"));
        assert!(script.contains("$img.Save('C:/Users/o''neil/clip.png'"));
    }
}
