//! Playwright integration for page capture.
//!
//! This module contains the inline capture script, error mapping,
//! and availability checks for Node.js and Playwright.

use crate::{ArchiveError, Result};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Capture script driven over stdin/stdout.
///
/// Writes one JSON object per line to stdout (`request`, `response`,
/// `failed`, `ready`, `snapshot`, `done`) and waits for `snapshot` / `close`
/// commands on stdin, so the caller decides when the page has settled.
pub(crate) const CAPTURE_SCRIPT: &str = r#"
const [, url, width, height, navTimeout, headlessFlag] = process.argv;
const readline = require('readline');

function emit(event) {
  process.stdout.write(JSON.stringify(event) + '\n');
}

function archivable(u) {
  return u.startsWith('http://') || u.startsWith('https://');
}

function serialize(node) {
  if (node.nodeType === Node.DOCUMENT_NODE) {
    return { type: 0, childNodes: Array.from(node.childNodes).map(serialize).filter(Boolean) };
  }
  if (node.nodeType === Node.DOCUMENT_TYPE_NODE) {
    return { type: 1, name: node.name, publicId: node.publicId, systemId: node.systemId };
  }
  if (node.nodeType === Node.ELEMENT_NODE) {
    const attributes = {};
    for (const attr of node.attributes) {
      attributes[attr.name] = attr.value;
    }
    const tag = node.tagName.toLowerCase();
    if (tag === 'input' || tag === 'textarea' || tag === 'select') {
      attributes.value = node.value;
    }
    return {
      type: 2,
      tagName: tag,
      attributes,
      childNodes: Array.from(node.childNodes).map(serialize).filter(Boolean)
    };
  }
  if (node.nodeType === Node.TEXT_NODE) {
    return { type: 3, textContent: node.textContent };
  }
  if (node.nodeType === Node.CDATA_SECTION_NODE) {
    return { type: 4, textContent: '' };
  }
  if (node.nodeType === Node.COMMENT_NODE) {
    return { type: 5, textContent: node.textContent };
  }
  return null;
}

async function run() {
  let browser;
  try {
    const { chromium } = require('playwright');
    browser = await chromium.launch({ headless: headlessFlag !== '0' });
    const context = await browser.newContext({
      viewport: { width: parseInt(width, 10), height: parseInt(height, 10) }
    });
    const page = await context.newPage();

    page.on('request', (request) => {
      if (archivable(request.url())) emit({ type: 'request', url: request.url() });
    });
    page.on('requestfinished', async (request) => {
      if (!archivable(request.url())) return;
      const response = await request.response().catch(() => null);
      if (!response) {
        emit({ type: 'failed', url: request.url(), error: 'No response received' });
        return;
      }
      let body;
      try {
        body = (await response.body()).toString('base64');
      } catch (err) {
        body = undefined;
      }
      emit({
        type: 'response',
        url: request.url(),
        status: response.status(),
        headers: await response.allHeaders(),
        body
      });
    });
    page.on('requestfailed', (request) => {
      if (!archivable(request.url())) return;
      const failure = request.failure();
      emit({ type: 'failed', url: request.url(), error: failure ? failure.errorText : 'Request failed' });
    });

    await page.goto(url, { waitUntil: 'load', timeout: parseInt(navTimeout, 10) });
    emit({ type: 'ready', url: page.url() });

    const commands = readline.createInterface({ input: process.stdin });
    for await (const line of commands) {
      const command = line.trim();
      if (command === 'snapshot') {
        const dom = await page.evaluate(`(${serialize.toString()})(document)`);
        emit({ type: 'snapshot', dom });
      } else if (command === 'close') {
        break;
      }
    }
    await browser.close();
    browser = undefined;
    emit({ type: 'done' });
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    console.error(JSON.stringify({ status: 'error', message }));
    process.exitCode = 1;
  } finally {
    if (browser) {
      await browser.close();
    }
  }
}

run();
"#;

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Script to check if Playwright is installed.
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// Error line written to stderr by the capture script.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ScriptError {
    pub status: String,
    pub message: String,
}

pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> ArchiveError {
    if err.kind() == io::ErrorKind::NotFound {
        ArchiveError::capture(format!(
            "Unable to spawn Playwright helper; '{}' was not found on PATH",
            command
        ))
    } else {
        ArchiveError::Io(err)
    }
}

/// Maps Playwright stderr output to a capture error with a hint where one
/// applies.
pub(crate) fn map_playwright_error(status_text: impl Into<String>, stderr: &str) -> ArchiveError {
    if let Some(error) = stderr
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<ScriptError>(line.trim()).ok())
    {
        return map_playwright_status_error(&error.status, error.message);
    }

    let lower = stderr.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        return ArchiveError::capture(
            "Playwright npm package is missing; install with `npm install playwright`.",
        );
    }

    if lower.contains("timeout") {
        return ArchiveError::capture(
            "Playwright timed out; try increasing --nav-timeout or --process-timeout, and ensure the page finishes loading.",
        );
    }

    ArchiveError::capture(format!(
        "Playwright exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

pub(crate) fn map_playwright_status_error(status: &str, message: String) -> ArchiveError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        ArchiveError::capture(
            "Playwright npm package is missing; install with `npm install playwright`.",
        )
    } else if lower.contains("timeout") {
        ArchiveError::capture(format!(
            "Playwright error (status {}): {}. Hint: increase --nav-timeout or --process-timeout, and ensure the page finishes loading.",
            status, message
        ))
    } else {
        ArchiveError::capture(format!("Playwright error (status {}): {}", status, message))
    }
}

pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            ArchiveError::capture(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(ArchiveError::capture(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            ArchiveError::capture(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_playwright_error(
            format!("{:?}", output.status),
            &stderr,
        ));
    }

    Ok(())
}
