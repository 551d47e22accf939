//! Static gallery emitter
//!
//! Renders one self-contained `model_card.html` per model: a header with the
//! model's remote link and tag list, a grid of media tiles, and a modal
//! overlay showing the enlarged media next to its generation parameters.
//! Image tiles reference `images/<filename>` relatively so the page keeps
//! working when the model directory is moved or exported.
//!
//! The Bootstrap and Google Fonts CDN links are decoration; the page renders
//! fine without network access.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::MODEL_CARD_FILE;
use crate::types::{ImageInfo, ModelInfo};

/// Escape a string for safe interpolation into HTML text and attributes.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Comma-joined lora names referenced by an image's generation resources.
fn lora_names(image: &ImageInfo) -> String {
    image
        .meta
        .resources
        .iter()
        .filter(|r| r.resource_type.eq_ignore_ascii_case("lora"))
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Human-readable reaction breakdown for an image.
fn reaction_summary(image: &ImageInfo) -> String {
    format!(
        "👍 {} ❤️ {} 😂 {}",
        image.stats.like_count, image.stats.heart_count, image.stats.laugh_count
    )
}

fn render_tile(image: &ImageInfo, index: usize) -> String {
    // Only images that made it to disk get a tile.
    let Some(local) = image.local_path.as_ref() else {
        return String::new();
    };
    let file_name = local
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("missing");
    let rel_src = format!("images/{}", html_escape(file_name));
    let prompt = html_escape(&image.meta.prompt);
    let checkpoint = html_escape(&image.meta.model);
    let loras = html_escape(&lora_names(image));
    let reactions = html_escape(&reaction_summary(image));

    let media = if file_name.to_ascii_lowercase().ends_with(".mp4") {
        format!(r#"<video controls preload="metadata" src="{rel_src}"></video>"#)
    } else {
        format!(r#"<img src="{rel_src}" loading="lazy" alt="preview {index}">"#)
    };

    format!(
        r#"      <figure class="tile" data-index="{index}" data-prompt="{prompt}" data-checkpoint="{checkpoint}" data-loras="{loras}" data-reactions="{reactions}">
        {media}
        <figcaption>{reactions}</figcaption>
      </figure>
"#
    )
}

fn render_tags(info: &ModelInfo) -> String {
    info.tags
        .iter()
        .map(|tag| {
            let escaped = html_escape(tag);
            format!(r#"<span class="tag-pill" data-tag="{escaped}" title="Click to copy">{escaped}</span>"#)
        })
        .collect::<Vec<_>>()
        .join("\n      ")
}

/// Render the complete gallery page for `info`.
///
/// `host` is the remote service root used for the "view on site" link.
pub fn render_model_card(info: &ModelInfo, host: &str) -> String {
    let name = html_escape(&info.name);
    let creator = html_escape(&info.creator);
    let version = html_escape(&info.version_name);
    let base_model = html_escape(&info.base_model);
    let model_type = html_escape(&info.model_type.to_string());
    let description = html_escape(&info.description);
    let remote = html_escape(&info.remote_page(host));
    let tags = render_tags(info);
    let tiles: String = info
        .images
        .iter()
        .enumerate()
        .map(|(i, img)| render_tile(img, i))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{name}</title>
<link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.3/dist/css/bootstrap.min.css" rel="stylesheet">
<link href="https://fonts.googleapis.com/css2?family=Inter:wght@400;600&display=swap" rel="stylesheet">
<style>
  body {{ font-family: 'Inter', system-ui, sans-serif; background: #14151a; color: #e8e8ea; }}
  .card-header-block {{ padding: 1.5rem; }}
  .tag-pill {{ display: inline-block; background: #2b2d36; border-radius: 999px; padding: .2rem .7rem; margin: .15rem; cursor: pointer; font-size: .85rem; }}
  .tag-pill:hover {{ background: #3c3f4d; }}
  .grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(240px, 1fr)); gap: .75rem; padding: 1.5rem; }}
  .tile {{ margin: 0; cursor: pointer; }}
  .tile img, .tile video {{ width: 100%; border-radius: .5rem; display: block; }}
  .tile figcaption {{ font-size: .8rem; color: #9a9ba3; padding: .2rem 0; }}
  #overlay {{ display: none; position: fixed; inset: 0; background: rgba(0,0,0,.85); z-index: 1000; }}
  #overlay.open {{ display: flex; }}
  #overlay .viewer {{ flex: 3; display: flex; align-items: center; justify-content: center; padding: 1rem; }}
  #overlay .viewer img, #overlay .viewer video {{ max-width: 100%; max-height: 95vh; border-radius: .5rem; }}
  #overlay .panel {{ flex: 1; background: #1d1e25; padding: 1.25rem; overflow-y: auto; min-width: 280px; }}
  #overlay .panel h6 {{ color: #9a9ba3; margin-top: 1rem; text-transform: uppercase; font-size: .7rem; letter-spacing: .06em; }}
  #overlay .panel p {{ white-space: pre-wrap; word-break: break-word; font-size: .85rem; }}
</style>
</head>
<body>
<div class="card-header-block">
  <h1>{name}</h1>
  <p>
    <a href="{remote}" target="_blank" rel="noopener">View on site</a>
    &middot; {model_type} &middot; {base_model} &middot; by {creator} &middot; {version}
  </p>
  <p class="description">{description}</p>
  <div class="tags">
      {tags}
  </div>
</div>
<div class="grid">
{tiles}</div>
<div id="overlay">
  <div class="viewer"></div>
  <div class="panel">
    <h6>Prompt</h6><p id="ov-prompt"></p>
    <h6>Checkpoint</h6><p id="ov-checkpoint"></p>
    <h6>Loras</h6><p id="ov-loras"></p>
    <h6>Reactions</h6><p id="ov-reactions"></p>
  </div>
</div>
<script>
  document.querySelectorAll('.tag-pill').forEach(function (pill) {{
    pill.addEventListener('click', function () {{
      navigator.clipboard && navigator.clipboard.writeText(pill.dataset.tag);
    }});
  }});
  var overlay = document.getElementById('overlay');
  var viewer = overlay.querySelector('.viewer');
  document.querySelectorAll('.tile').forEach(function (tile) {{
    tile.addEventListener('click', function () {{
      var media = tile.querySelector('img, video');
      viewer.innerHTML = '';
      var clone = media.cloneNode(true);
      if (clone.tagName === 'VIDEO') {{ clone.controls = true; }}
      viewer.appendChild(clone);
      document.getElementById('ov-prompt').textContent = tile.dataset.prompt;
      document.getElementById('ov-checkpoint').textContent = tile.dataset.checkpoint;
      document.getElementById('ov-loras').textContent = tile.dataset.loras;
      document.getElementById('ov-reactions').textContent = tile.dataset.reactions;
      overlay.classList.add('open');
    }});
  }});
  overlay.addEventListener('click', function (e) {{
    if (e.target === overlay || e.target === viewer) {{ overlay.classList.remove('open'); }}
  }});
</script>
</body>
</html>
"#
    )
}

/// Render and write `model_card.html` into `dir`, returning the written path.
///
/// # Errors
///
/// Returns an I/O error when the file cannot be written.
pub async fn write_model_card(info: &ModelInfo, dir: &Path, host: &str) -> Result<PathBuf> {
    let path = dir.join(MODEL_CARD_FILE);
    let html = render_model_card(info, host);
    tokio::fs::write(&path, html)
        .await
        .map_err(|e| Error::from_write_error(e, &path))?;
    tracing::info!(path = %path.display(), "Gallery written");
    Ok(path)
}
