//! Route filter conversion and validation.
//!
//! Filters arrive as Gateway API unions and are converted into a closed
//! enum; variants the data plane cannot express are rejected during route
//! construction so the owning rule is marked invalid.

use crate::resource_id::ResourceId;
use ahash::AHashMap;
use anyhow::{anyhow, bail, Result};
use stategraph_k8s_api::{gateway, policy};

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    RequestHeaderModifier(HeaderModifier),
    ResponseHeaderModifier(HeaderModifier),
    RequestRedirect(RequestRedirect),
    UrlRewrite(UrlRewrite),
    RequestMirror(RequestMirror),
    ExtensionRef(ResolvedExtensionFilter),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderModifier {
    pub set: Vec<Header>,
    pub add: Vec<Header>,
    pub remove: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestRedirect {
    pub scheme: Option<String>,
    pub hostname: Option<String>,
    pub path: Option<PathModifier>,
    pub port: Option<u16>,
    pub status_code: Option<u16>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UrlRewrite {
    pub hostname: Option<String>,
    pub path: Option<PathModifier>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PathModifier {
    Full(String),
    Prefix(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestMirror {
    pub service: ResourceId,
    pub port: Option<u16>,
}

/// An `extensionRef` filter resolved against the snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedExtensionFilter {
    pub id: ResourceId,
    pub directives: Vec<policy::Directive>,
}

/// Looks up `extensionRef` targets. Route builders take this as a seam so
/// the concrete extension implementation stays outside the engine.
pub(crate) struct ExtensionRefResolver<'a> {
    filters: &'a AHashMap<ResourceId, policy::ExtensionFilter>,
}

// === impl ExtensionRefResolver ===

impl<'a> ExtensionRefResolver<'a> {
    pub(crate) fn new(filters: &'a AHashMap<ResourceId, policy::ExtensionFilter>) -> Self {
        Self { filters }
    }

    fn resolve(
        &self,
        ns: &str,
        extension_ref: &gateway::LocalObjectReference,
    ) -> Result<ResolvedExtensionFilter> {
        if !extension_ref.group.eq_ignore_ascii_case(policy::GROUP)
            || !extension_ref.kind.eq_ignore_ascii_case("ExtensionFilter")
        {
            bail!(
                "unsupported extensionRef kind {}.{}",
                extension_ref.kind,
                extension_ref.group,
            );
        }

        let id = ResourceId::new(ns.to_string(), extension_ref.name.clone());
        let filter = self
            .filters
            .get(&id)
            .ok_or_else(|| anyhow!("ExtensionFilter {id} does not exist"))?;

        Ok(ResolvedExtensionFilter {
            id,
            directives: filter.spec.directives.clone(),
        })
    }
}

pub(crate) fn convert_http_filter(
    ns: &str,
    ext: &ExtensionRefResolver<'_>,
    filter: gateway::HttpRouteFilter,
) -> Result<Filter> {
    let filter = match filter {
        gateway::HttpRouteFilter::RequestHeaderModifier {
            request_header_modifier,
        } => Filter::RequestHeaderModifier(header_modifier(request_header_modifier)?),

        gateway::HttpRouteFilter::ResponseHeaderModifier {
            response_header_modifier,
        } => Filter::ResponseHeaderModifier(header_modifier(response_header_modifier)?),

        gateway::HttpRouteFilter::RequestRedirect { request_redirect } => {
            Filter::RequestRedirect(req_redirect(request_redirect)?)
        }

        gateway::HttpRouteFilter::URLRewrite { url_rewrite } => {
            Filter::UrlRewrite(url_rewrite_filter(url_rewrite)?)
        }

        gateway::HttpRouteFilter::RequestMirror { request_mirror } => {
            Filter::RequestMirror(req_mirror(ns, request_mirror)?)
        }

        gateway::HttpRouteFilter::ExtensionRef { extension_ref } => {
            Filter::ExtensionRef(ext.resolve(ns, &extension_ref)?)
        }
    };
    Ok(filter)
}

/// Only the header-modifier subset survives normalization onto the
/// canonical rule model; the remaining gRPC filters are rejected.
pub(crate) fn convert_grpc_filter(filter: gateway::GrpcRouteFilter) -> Result<Filter> {
    let filter = match filter {
        gateway::GrpcRouteFilter::RequestHeaderModifier {
            request_header_modifier,
        } => Filter::RequestHeaderModifier(header_modifier(request_header_modifier)?),

        gateway::GrpcRouteFilter::ResponseHeaderModifier {
            response_header_modifier,
        } => Filter::ResponseHeaderModifier(header_modifier(response_header_modifier)?),

        gateway::GrpcRouteFilter::RequestMirror { .. } => {
            bail!("RequestMirror filter is not supported for gRPC routes")
        }
        gateway::GrpcRouteFilter::ExtensionRef { .. } => {
            bail!("ExtensionRef filter is not supported for gRPC routes")
        }
    };
    Ok(filter)
}

pub(crate) fn header_modifier(
    gateway::HttpRequestHeaderFilter { set, add, remove }: gateway::HttpRequestHeaderFilter,
) -> Result<HeaderModifier> {
    Ok(HeaderModifier {
        set: set
            .into_iter()
            .flatten()
            .map(header)
            .collect::<Result<_>>()?,
        add: add
            .into_iter()
            .flatten()
            .map(header)
            .collect::<Result<_>>()?,
        remove: remove
            .into_iter()
            .flatten()
            .map(|name| {
                validate_header_name(&name)?;
                Ok(name)
            })
            .collect::<Result<_>>()?,
    })
}

fn header(gateway::HttpHeader { name, value }: gateway::HttpHeader) -> Result<Header> {
    validate_header_name(&name)?;
    Ok(Header { name, value })
}

fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("header name cannot be empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("invalid header name {name:?}");
    }
    Ok(())
}

fn req_redirect(
    gateway::HttpRequestRedirectFilter {
        scheme,
        hostname,
        path,
        port,
        status_code,
    }: gateway::HttpRequestRedirectFilter,
) -> Result<RequestRedirect> {
    if let Some(scheme) = scheme.as_deref() {
        if scheme != "http" && scheme != "https" {
            bail!("unsupported redirect scheme {scheme:?}");
        }
    }
    if let Some(hostname) = hostname.as_deref() {
        crate::hostname::validate(hostname)?;
        if hostname.contains('*') {
            bail!("redirect hostname {hostname:?} cannot be a wildcard");
        }
    }
    if let Some(code) = status_code {
        if code != 301 && code != 302 {
            bail!("unsupported redirect status code {code}");
        }
    }

    Ok(RequestRedirect {
        scheme,
        hostname,
        path: path.map(path_modifier).transpose()?,
        port,
        status_code,
    })
}

fn url_rewrite_filter(
    gateway::HttpUrlRewriteFilter { hostname, path }: gateway::HttpUrlRewriteFilter,
) -> Result<UrlRewrite> {
    if let Some(hostname) = hostname.as_deref() {
        crate::hostname::validate(hostname)?;
        if hostname.contains('*') {
            bail!("rewrite hostname {hostname:?} cannot be a wildcard");
        }
    }

    Ok(UrlRewrite {
        hostname,
        path: path.map(path_modifier).transpose()?,
    })
}

fn req_mirror(
    ns: &str,
    gateway::HttpRequestMirrorFilter { backend_ref }: gateway::HttpRequestMirrorFilter,
) -> Result<RequestMirror> {
    if backend_ref.kind.as_deref().unwrap_or("Service") != "Service"
        || !backend_ref
            .group
            .as_deref()
            .map_or(true, |g| g.is_empty() || g.eq_ignore_ascii_case("core"))
    {
        bail!("mirror backends must be Services");
    }

    let namespace = backend_ref.namespace.unwrap_or_else(|| ns.to_string());
    Ok(RequestMirror {
        service: ResourceId::new(namespace, backend_ref.name),
        port: backend_ref.port,
    })
}

fn path_modifier(path_modifier: gateway::HttpPathModifier) -> Result<PathModifier> {
    use gateway::HttpPathModifier::*;
    match path_modifier {
        ReplaceFullPath {
            replace_full_path: path,
        }
        | ReplacePrefixMatch {
            replace_prefix_match: path,
        } if !path.starts_with('/') => {
            bail!("path modifiers may only contain absolute paths; {path:?} is not absolute")
        }
        ReplaceFullPath { replace_full_path } => Ok(PathModifier::Full(replace_full_path)),
        ReplacePrefixMatch {
            replace_prefix_match,
        } => Ok(PathModifier::Prefix(replace_prefix_match)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_extensions() -> AHashMap<ResourceId, policy::ExtensionFilter> {
        Default::default()
    }

    #[test]
    fn converts_header_modifier() {
        let filters = no_extensions();
        let ext = ExtensionRefResolver::new(&filters);
        let filter = convert_http_filter(
            "apps",
            &ext,
            gateway::HttpRouteFilter::RequestHeaderModifier {
                request_header_modifier: gateway::HttpRequestHeaderFilter {
                    set: Some(vec![gateway::HttpHeader {
                        name: "x-region".to_string(),
                        value: "eu".to_string(),
                    }]),
                    add: None,
                    remove: Some(vec!["x-debug".to_string()]),
                },
            },
        )
        .expect("valid filter");

        match filter {
            Filter::RequestHeaderModifier(m) => {
                assert_eq!(m.set.len(), 1);
                assert_eq!(m.remove, vec!["x-debug".to_string()]);
            }
            other => panic!("unexpected filter {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_header_name() {
        let filters = no_extensions();
        let ext = ExtensionRefResolver::new(&filters);
        let result = convert_http_filter(
            "apps",
            &ext,
            gateway::HttpRouteFilter::RequestHeaderModifier {
                request_header_modifier: gateway::HttpRequestHeaderFilter {
                    set: Some(vec![gateway::HttpHeader {
                        name: "bad header".to_string(),
                        value: "v".to_string(),
                    }]),
                    add: None,
                    remove: None,
                },
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_redirect_with_bad_scheme() {
        let result = req_redirect(gateway::HttpRequestRedirectFilter {
            scheme: Some("ftp".to_string()),
            hostname: None,
            path: None,
            port: None,
            status_code: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn converts_redirect_filter_from_manifest() {
        let source: gateway::HttpRouteFilter = serde_json::from_value(serde_json::json!({
            "type": "RequestRedirect",
            "requestRedirect": {
                "scheme": "https",
                "statusCode": 301,
            },
        }))
        .expect("valid manifest");

        let filters = no_extensions();
        let ext = ExtensionRefResolver::new(&filters);
        let filter = convert_http_filter("apps", &ext, source).expect("valid filter");
        assert_eq!(
            filter,
            Filter::RequestRedirect(RequestRedirect {
                scheme: Some("https".to_string()),
                status_code: Some(301),
                ..Default::default()
            }),
        );
    }

    #[test]
    fn rejects_relative_path_modifier() {
        let result = path_modifier(gateway::HttpPathModifier::ReplaceFullPath {
            replace_full_path: "relative".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_grpc_mirror() {
        let result = convert_grpc_filter(gateway::GrpcRouteFilter::RequestMirror {
            request_mirror: gateway::HttpRequestMirrorFilter {
                backend_ref: gateway::BackendObjectReference {
                    group: None,
                    kind: None,
                    name: "mirror".to_string(),
                    namespace: None,
                    port: None,
                },
            },
        });
        assert!(result.is_err());
    }

    #[test]
    fn resolves_extension_ref() {
        let id = ResourceId::new("apps".to_string(), "snippets".to_string());
        let mut filters = AHashMap::default();
        filters.insert(
            id.clone(),
            policy::ExtensionFilter::new(
                "snippets",
                policy::ExtensionFilterSpec {
                    directives: vec![policy::Directive {
                        context: policy::DirectiveContext::Http,
                        value: "gzip on".to_string(),
                    }],
                },
            ),
        );
        let ext = ExtensionRefResolver::new(&filters);

        let filter = ext
            .resolve(
                "apps",
                &gateway::LocalObjectReference {
                    group: policy::GROUP.to_string(),
                    kind: "ExtensionFilter".to_string(),
                    name: "snippets".to_string(),
                },
            )
            .expect("resolves");
        assert_eq!(filter.id, id);
        assert_eq!(filter.directives.len(), 1);
    }

    #[test]
    fn unresolved_extension_ref_fails() {
        let filters = no_extensions();
        let ext = ExtensionRefResolver::new(&filters);
        let result = ext.resolve(
            "apps",
            &gateway::LocalObjectReference {
                group: policy::GROUP.to_string(),
                kind: "ExtensionFilter".to_string(),
                name: "ghost".to_string(),
            },
        );
        assert!(result.is_err());
    }
}
