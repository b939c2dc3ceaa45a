use std::path::{Path, PathBuf};

/// Returns the HEAD commit of the git checkout enclosing `path`, if any.
pub(super) fn head_revision(path: &Path) -> Option<String> {
    let git_dir = find_git_dir(path)?;
    let head = std::fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let head = head.trim();

    match head.strip_prefix("ref:") {
        Some(reference) => {
            let reference = reference.trim();
            resolve_reference(&git_dir, reference).or_else(|| {
                let common_dir = common_dir(&git_dir)?;
                resolve_reference(&common_dir, reference)
            })
        }
        None => is_object_id(head).then(|| head.to_owned()),
    }
}

/// Branch refs of a linked worktree live in the directory named by `commondir`.
fn common_dir(git_dir: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(git_dir.join("commondir")).ok()?;
    let target = content.trim();
    (!target.is_empty()).then(|| git_dir.join(target))
}

fn find_git_dir(path: &Path) -> Option<PathBuf> {
    for directory in path.ancestors() {
        let candidate = directory.join(".git");
        if candidate.is_dir() {
            return Some(candidate);
        }

        // Worktrees and submodules point at the real git dir from a file.
        if candidate.is_file() {
            let content = std::fs::read_to_string(&candidate).ok()?;
            let target = content.trim().strip_prefix("gitdir:")?.trim();
            return Some(directory.join(target));
        }
    }

    None
}

fn resolve_reference(git_dir: &Path, reference: &str) -> Option<String> {
    if let Ok(content) = std::fs::read_to_string(git_dir.join(reference)) {
        let object_id = content.trim();
        if is_object_id(object_id) {
            return Some(object_id.to_owned());
        }
    }

    let packed = std::fs::read_to_string(git_dir.join("packed-refs")).ok()?;
    packed
        .lines()
        .filter(|line| !line.starts_with('#') && !line.starts_with('^'))
        .filter_map(|line| line.split_once(' '))
        .find(|(_, name)| *name == reference)
        .map(|(object_id, _)| object_id.to_owned())
        .filter(|object_id| is_object_id(object_id))
}

fn is_object_id(value: &str) -> bool {
    matches!(value.len(), 40 | 64) && value.chars().all(|character| character.is_ascii_hexdigit())
}
