use crate::error::RetagError;

pub const DEFAULT_TAG: &str = "latest";
const MAX_TAG_LEN: usize = 128;

// `[A-Za-z0-9_][A-Za-z0-9_.-]*`, the docker tag grammar.
fn is_valid_tag(tag: &str) -> bool {
    tag.len() <= MAX_TAG_LEN
        && tag.chars().enumerate().all(|(idx, c)| {
            c.is_ascii_alphanumeric() || c == '_' || (idx > 0 && (c == '.' || c == '-'))
        })
}

fn is_valid_path_component(component: &str) -> bool {
    component
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn is_valid_registry(registry: &str) -> bool {
    registry
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}

/// A fully qualified `registry/repository[:tag]` reference.
///
/// There is no implicit registry: the first `/` delimited part is always the
/// registry host, so `library/nginx` is parsed as repository `nginx` on a
/// registry named `library`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ImageRef {
    registry: String,
    repository: String,
    tag: String,
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<ImageRef, RetagError> {
        let fail = |reason: &'static str| RetagError::ReferenceParse {
            reference: reference.to_string(),
            reason,
        };

        let parts: Vec<&str> = reference.split('/').collect();
        if parts.len() < 2 {
            return Err(fail("no registry found"));
        }
        let registry = parts[0];
        if registry.is_empty() {
            return Err(fail("empty registry"));
        }
        if !is_valid_registry(registry) {
            return Err(fail("invalid character in registry"));
        }

        let (last, path) = parts[1..]
            .split_last()
            .ok_or_else(|| fail("no repository found"))?;
        let (name, tag) = match last.split(':').collect::<Vec<_>>().as_slice() {
            [name] => (*name, DEFAULT_TAG),
            [name, tag] => (*name, *tag),
            _ => return Err(fail("multiple ':' in last part")),
        };
        if tag.is_empty() {
            return Err(fail("empty tag"));
        }
        if !is_valid_tag(tag) {
            return Err(fail("invalid tag"));
        }

        if name.is_empty() || path.iter().any(|p| p.is_empty()) {
            return Err(fail("empty repository path component"));
        }
        if !path
            .iter()
            .chain(std::iter::once(&name))
            .all(|p| is_valid_path_component(p))
        {
            return Err(fail("invalid character in repository"));
        }
        let mut repository = path.join("/");
        if !repository.is_empty() {
            repository.push('/');
        }
        repository.push_str(name);

        Ok(ImageRef {
            registry: registry.to_string(),
            repository,
            tag: tag.to_string(),
        })
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Both sides of a retag must live on the same registry host, mounts do not
/// cross registries.
pub fn ensure_same_registry(source: &ImageRef, destination: &ImageRef) -> Result<(), RetagError> {
    if source.registry != destination.registry {
        return Err(RetagError::CrossRegistry {
            source_registry: source.registry.clone(),
            destination_registry: destination.registry.clone(),
        });
    }
    Ok(())
}
