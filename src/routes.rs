use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use http::{StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use url::{Position, Url};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{NovelError, Result};
use crate::models::{
    AiSettings, ChapterContent, ChapterEntry, ChapterKey, ChapterList, ChapterRef, Glossary,
    JobAccepted, JobStatus, Navigation, Novel,
};
use crate::services::cleaner::html_to_plain_text;
use crate::services::glossary::GlossaryService;
use crate::services::index::list_chapters;
use crate::services::library::Library;
use crate::services::llm::{Rewriter, ask_about, rewrite_text};
use crate::services::preload::{PreloadJob, PreloadQueue};
use crate::services::reader::{ChapterReader, ReadOptions, load_all_chapters};
use crate::services::rewrite::{CacheState, RewriteCache, RewriteOutcome};
use crate::services::settings::SettingsStore;

#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    pub settings: Arc<SettingsStore>,
    pub cache: Arc<RewriteCache>,
    pub reader: Arc<ChapterReader>,
    pub preload: PreloadQueue,
    pub glossary: Arc<GlossaryService>,
    pub rewriter: Arc<dyn Rewriter>,
}

impl AppState {
    pub fn new(
        library: Arc<Library>,
        settings: Arc<SettingsStore>,
        rewriter: Arc<dyn Rewriter>,
        preload: PreloadQueue,
        config: &Config,
    ) -> Self {
        let cache = Arc::new(RewriteCache::new(library.clone(), rewriter.clone()));
        let reader = ChapterReader::new(library.clone(), settings.clone(), cache.clone(), preload.clone())
            .inline_generation(config.reader.inline_generation)
            .prefetch_next(config.preload.prefetch_next);
        let glossary = GlossaryService::new(library.clone(), rewriter.clone(), config.glossary.chunk_chars);

        Self {
            library,
            settings,
            cache,
            reader: Arc::new(reader),
            preload,
            glossary: Arc::new(glossary),
            rewriter,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let covers = ServeDir::new(state.library.root());

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/novels/:novel", get(chapter_index))
        .route("/api/novels", get(novels))
        .route("/api/novels/:novel/chapters", get(chapters))
        .route("/api/novels/:novel/all-chapters", get(all_chapters))
        .route("/api/novels/:novel/chapters/:volume/:chapter", get(chapter_page))
        .route("/api/novels/:novel/chapters/:volume/:chapter/json", get(chapter_json))
        .route("/api/novels/:novel/chapters/:volume/:chapter/ai-exists", get(ai_exists))
        .route("/api/novels/:novel/chapters/:volume/:chapter/regenerate", post(regenerate))
        .route("/api/novels/:novel/bulk-generate", post(bulk_generate))
        .route("/api/novels/:novel/glossary", get(glossary))
        .route("/api/novels/:novel/glossary/generate", post(generate_glossary))
        .route("/api/jobs/:id", get(job_status))
        .route("/api/settings/ai-rewrite", get(ai_settings).post(update_ai_settings))
        .route("/api/ai/ask", post(ask))
        .route("/api/rewrite", post(rewrite))
        .nest_service("/covers", covers)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ChapterQuery {
    #[serde(default, rename = "useAI")]
    use_ai: bool,
    #[serde(default)]
    compare: bool,
    #[serde(default, rename = "plainText")]
    plain_text: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkQuery {
    start_chapter: Option<String>,
    end_chapter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettings {
    enabled: bool,
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    question: String,
}

#[derive(Debug, Deserialize)]
pub struct RewriteBody {
    #[serde(default)]
    text: String,
    style: Option<String>,
}

async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    let novels = state.library.list_novels().await?;
    Ok(Html(render_index(&novels)))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn novels(State(state): State<AppState>) -> Result<Json<Vec<Novel>>> {
    Ok(Json(state.library.list_novels().await?))
}

async fn chapters(State(state): State<AppState>, Path(novel): Path<String>) -> Result<Json<ChapterList>> {
    Ok(Json(list_chapters(&state.library, &novel).await?))
}

async fn chapter_index(State(state): State<AppState>, Path(novel): Path<String>) -> Result<Html<String>> {
    let list = list_chapters(&state.library, &novel).await?;
    Ok(Html(render_chapter_list(&novel, &list)))
}

async fn all_chapters(State(state): State<AppState>, Path(novel): Path<String>) -> Result<Json<Vec<ChapterEntry>>> {
    Ok(Json(load_all_chapters(&state.library, &novel).await?))
}

async fn read_chapter(state: &AppState, key: &ChapterKey, query: &ChapterQuery) -> Result<ChapterContent> {
    let options = ReadOptions {
        use_ai: query.use_ai,
        compare: query.compare,
    };
    let mut content = state.reader.read(key, options).await?;
    if query.plain_text {
        content.body = html_to_plain_text(&content.body);
    }
    Ok(content)
}

async fn chapter_page(
    State(state): State<AppState>,
    Path((novel, volume, chapter)): Path<(String, String, String)>,
    Query(query): Query<ChapterQuery>,
) -> Result<Response> {
    let key = ChapterKey::new(&novel, &volume, &chapter);
    let content = read_chapter(&state, &key, &query).await?;
    let navigation = list_chapters(&state.library, &novel)
        .await?
        .neighbors(&volume, &chapter);

    Ok(no_store(Html(render_chapter(&novel, &content, &navigation, &query))))
}

async fn chapter_json(
    State(state): State<AppState>,
    Path((novel, volume, chapter)): Path<(String, String, String)>,
    Query(query): Query<ChapterQuery>,
) -> Result<Response> {
    let key = ChapterKey::new(&novel, &volume, &chapter);
    let content = read_chapter(&state, &key, &query).await?;
    Ok(no_store(Json(content)))
}

async fn ai_exists(
    State(state): State<AppState>,
    Path((novel, volume, chapter)): Path<(String, String, String)>,
) -> Result<Json<Value>> {
    let key = ChapterKey::new(&novel, &volume, &chapter);
    let exists = matches!(state.cache.lookup(&key).await?, CacheState::Generated(_));
    Ok(Json(json!({ "exists": exists })))
}

async fn regenerate(
    State(state): State<AppState>,
    Path((novel, volume, chapter)): Path<(String, String, String)>,
) -> Result<Json<Value>> {
    let key = ChapterKey::new(&novel, &volume, &chapter);
    let settings = state.settings.load().await;

    let chapter = match state.cache.regenerate(&key, &settings).await? {
        RewriteOutcome::Failed(reason) => return Err(NovelError::AiGenerationFailed(reason)),
        RewriteOutcome::Cached(chapter) | RewriteOutcome::Generated(chapter) => chapter,
    };
    state.preload.enqueue(PreloadJob::NextAfter(key));

    Ok(Json(json!({ "success": true, "data": chapter })))
}

async fn bulk_generate(
    State(state): State<AppState>,
    Path(novel): Path<String>,
    Query(query): Query<BulkQuery>,
) -> Result<(StatusCode, Json<JobAccepted>)> {
    state.library.resolve(&novel).await?;
    let job_id = state
        .preload
        .submit_bulk(&novel, query.start_chapter, query.end_chapter)?;

    tracing::info!(%job_id, novel = %novel, "Bulk generation queued");
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<JobStatus>> {
    Uuid::parse_str(&id)
        .ok()
        .and_then(|job_id| state.preload.status(&job_id))
        .map(Json)
        .ok_or(NovelError::JobNotFound(id))
}

async fn ai_settings(State(state): State<AppState>) -> Json<AiSettings> {
    Json(state.settings.load().await)
}

async fn update_ai_settings(
    State(state): State<AppState>,
    Json(body): Json<UpdateSettings>,
) -> Result<Json<AiSettings>> {
    Ok(Json(state.settings.update(body.enabled, body.prompt).await?))
}

async fn glossary(State(state): State<AppState>, Path(novel): Path<String>) -> Result<Json<Glossary>> {
    Ok(Json(state.glossary.get(&novel).await?.unwrap_or_default()))
}

async fn generate_glossary(State(state): State<AppState>, Path(novel): Path<String>) -> Result<Json<Glossary>> {
    Ok(Json(state.glossary.generate(&novel).await?))
}

async fn ask(State(state): State<AppState>, Json(body): Json<AskBody>) -> Result<Json<Value>> {
    if body.question.trim().is_empty() {
        return Err(NovelError::BadRequest("Question is required".to_string()));
    }

    let settings = state.settings.load().await;
    let answer = ask_about(state.rewriter.as_ref(), &body.question, settings.effective_prompt())
        .await
        .map_err(|e| NovelError::AiProvider(format!("{:#}", e)))?;

    Ok(Json(json!({ "answer": answer })))
}

async fn rewrite(State(state): State<AppState>, Json(body): Json<RewriteBody>) -> Result<Json<Value>> {
    if body.text.trim().is_empty() {
        return Err(NovelError::BadRequest("Text is required".to_string()));
    }

    let text = rewrite_text(state.rewriter.as_ref(), &body.text, body.style.as_deref())
        .await
        .map_err(|e| NovelError::AiProvider(format!("{:#}", e)))?;

    Ok(Json(json!({ "text": text })))
}

/// Chapter responses change as soon as a rewrite lands; browsers must not keep them.
fn no_store(response: impl IntoResponse) -> Response {
    (
        [
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        response,
    )
        .into_response()
}

/// Root-relative link to a chapter page, carrying the reader's current flags.
fn chapter_href(novel_id: &str, chapter: &ChapterRef, query: &ChapterQuery) -> Option<String> {
    let mut url = Url::parse("http://localhost/").ok()?;
    url.path_segments_mut()
        .ok()?
        .clear()
        .extend(["api", "novels", novel_id, "chapters", chapter.volume.as_str(), chapter.chapter.as_str()]);

    let flags: Vec<&str> = [
        (query.use_ai, "useAI"),
        (query.compare, "compare"),
        (query.plain_text, "plainText"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();

    if !flags.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for flag in flags {
            pairs.append_pair(flag, "true");
        }
    }

    Some(url[Position::BeforePath..].to_string())
}

fn render_index(novels: &[Novel]) -> String {
    let items: String = novels
        .iter()
        .map(|novel| {
            format!(
                r#"<li><img src="{cover}" alt="" loading="lazy"><a href="/novels/{id}">{title}</a> <span class="author">{author}</span></li>"#,
                cover = html_escape::encode_double_quoted_attribute(&novel.cover_url),
                id = html_escape::encode_double_quoted_attribute(&novel.id),
                title = html_escape::encode_text(&novel.title),
                author = html_escape::encode_text(novel.author.as_deref().unwrap_or("")),
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Light Novel Reader</title>
    <meta charset="utf-8">
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        li {{ display: flex; align-items: center; gap: 12px; margin: 8px 0; }}
        img {{ width: 48px; height: 64px; object-fit: cover; }}
        .author {{ color: #777; }}
    </style>
</head>
<body>
    <h1>Light Novel Reader</h1>
    <ul>{}</ul>
</body>
</html>"#,
        items
    )
}

fn render_chapter_list(novel_id: &str, list: &ChapterList) -> String {
    let query = ChapterQuery::default();
    let mut sections = String::new();
    let mut current_volume: Option<&str> = None;

    for chapter in &list.chapters {
        if current_volume != Some(chapter.volume.as_str()) {
            if current_volume.is_some() {
                sections.push_str("</ul>\n");
            }
            sections.push_str(&format!(
                "<h2>{}</h2>\n<ul>",
                html_escape::encode_text(&chapter.volume)
            ));
            current_volume = Some(chapter.volume.as_str());
        }
        if let Some(href) = chapter_href(novel_id, chapter, &query) {
            sections.push_str(&format!(
                r#"<li><a href="{}">Chapter {}</a></li>"#,
                html_escape::encode_double_quoted_attribute(&href),
                html_escape::encode_text(&chapter.chapter)
            ));
        }
    }
    if current_volume.is_some() {
        sections.push_str("</ul>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    <meta charset="utf-8">
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        ul {{ columns: 3; }}
    </style>
</head>
<body>
    <p><a href="/">All novels</a></p>
    <h1>{title}</h1>
    {sections}
</body>
</html>"#,
        title = html_escape::encode_text(&list.title),
        sections = sections,
    )
}

fn render_chapter(novel_id: &str, content: &ChapterContent, navigation: &Navigation, query: &ChapterQuery) -> String {
    let link = |target: &Option<ChapterRef>, label: &str| match target
        .as_ref()
        .and_then(|chapter| chapter_href(novel_id, chapter, query))
    {
        Some(href) => format!(
            r#"<a href="{}">{}</a>"#,
            html_escape::encode_double_quoted_attribute(&href),
            label
        ),
        None => format!(r#"<span class="disabled">{}</span>"#, label),
    };
    let nav = format!(
        r#"<nav>{} | {}</nav>"#,
        link(&navigation.prev, "Previous"),
        link(&navigation.next, "Next")
    );

    let notice = if content.no_ai_content {
        r#"<p class="notice">The AI version of this chapter is not ready yet. Reload in a moment.</p>"#
    } else {
        ""
    };

    let body = if query.plain_text {
        format!("<pre>{}</pre>", html_escape::encode_text(&content.body))
    } else {
        content.body.clone()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{title} - {novel}</title>
    <meta charset="utf-8">
    <style>
        body {{ font-family: Georgia, serif; max-width: 860px; margin: 40px auto; line-height: 1.6; }}
        nav {{ margin: 16px 0; }}
        .disabled {{ color: #aaa; }}
        .notice {{ background-color: #fff4e5; padding: 10px; border-radius: 4px; }}
        .paragraph-pair {{ display: grid; grid-template-columns: 3fr 2fr; gap: 16px; }}
        .original-text {{ color: #888; font-size: 0.9em; }}
        pre {{ white-space: pre-wrap; font-family: inherit; }}
    </style>
</head>
<body>
    <h2>{novel}</h2>
    <h1>{title}</h1>
    {nav}
    {notice}
    <article>{body}</article>
    {nav}
</body>
</html>"#,
        title = html_escape::encode_text(&content.title),
        novel = html_escape::encode_text(&content.novel_title),
        nav = nav,
        notice = notice,
        body = body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::testing::ScriptedRewriter;
    use crate::services::testing::LibraryFixture;
    use axum::{body, body::Body};
    use http::Request;
    use serde_json::json;
    use tokio::sync::mpsc::Receiver;
    use tower::ServiceExt;

    struct TestApp {
        fixture: LibraryFixture,
        state: AppState,
        jobs: Receiver<PreloadJob>,
    }

    fn test_app(ai_enabled: bool, rewriter: ScriptedRewriter) -> TestApp {
        let fixture = LibraryFixture::new();
        fixture.novel("site", "foo", "Foo & Bar");
        fixture.chapter("site", "foo", "Volume 1", "1", "<p>Chapter 1</p><p>Hello world.</p>");
        fixture.chapter("site", "foo", "Volume 1", "2", "<p>Goodbye world.</p>");

        let (queue, jobs) = PreloadQueue::channel(8);
        let state = AppState::new(
            Arc::new(fixture.library()),
            Arc::new(fixture.settings(ai_enabled)),
            Arc::new(rewriter),
            queue,
            &Config::default(),
        );
        TestApp { fixture, state, jobs }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Response) {
        let response = create_router(app.state.clone()).oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
        let (status, response) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, json_body(response).await)
    }

    async fn post_json(app: &TestApp, uri: &str, payload: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, response) = send(app, request).await;
        (status, json_body(response).await)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_app(false, ScriptedRewriter::default());
        let (status, response) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn lists_novels_and_chapters() {
        let app = test_app(false, ScriptedRewriter::default());

        let (status, novels) = get_json(&app, "/api/novels").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(novels[0]["id"], "foo");
        assert_eq!(novels[0]["title"], "Foo & Bar");
        assert_eq!(novels[0]["coverUrl"], "/covers/site/foo/cover.jpg");

        let (status, list) = get_json(&app, "/api/novels/foo/chapters").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["title"], "Foo & Bar");
        assert_eq!(list["chapters"].as_array().unwrap().len(), 2);
        assert_eq!(list["chapters"][1]["chapter"], "2");
    }

    #[tokio::test]
    async fn chapter_json_serves_original_when_ai_disabled() {
        let app = test_app(false, ScriptedRewriter::default());

        let (status, content) = get_json(&app, "/api/novels/foo/chapters/Volume%201/1/json?useAI=true").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content["body"], "<p>Hello world.</p>");
        assert_eq!(content["novelTitle"], "Foo & Bar");
        assert_eq!(content["noAIContent"], false);
    }

    #[tokio::test]
    async fn plain_text_flag_strips_markup() {
        let app = test_app(false, ScriptedRewriter::default());

        let (_, content) = get_json(&app, "/api/novels/foo/chapters/Volume%201/1/json?plainText=true").await;

        assert_eq!(content["body"], "Hello world.");
    }

    #[tokio::test]
    async fn chapter_page_has_navigation_and_no_store() {
        let app = test_app(false, ScriptedRewriter::default());
        let request = Request::get("/api/novels/foo/chapters/Volume%201/1?useAI=true")
            .body(Body::empty())
            .unwrap();

        let (status, response) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );

        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Foo &amp; Bar"));
        assert!(html.contains(r#"href="/api/novels/foo/chapters/Volume%201/2?useAI=true""#));
        assert!(html.contains(r#"<span class="disabled">Previous</span>"#));
    }

    #[tokio::test]
    async fn missing_chapter_is_not_found() {
        let app = test_app(false, ScriptedRewriter::default());

        let (status, error) = get_json(&app, "/api/novels/foo/chapters/Volume%201/9/json").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(error["error"].as_str().unwrap().contains("Chapter 9"));

        let (status, _) = get_json(&app, "/api/novels/nope/chapters").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ai_exists_reflects_valid_cache_only() {
        let app = test_app(true, ScriptedRewriter::default());
        let uri = "/api/novels/foo/chapters/Volume%201/1/ai-exists";

        assert_eq!(get_json(&app, uri).await.1["exists"], false);

        app.fixture
            .write_ai_file("site", "foo", "Volume 1", "1", &json!({ "body": "<p>AI.</p>" }));
        assert_eq!(get_json(&app, uri).await.1["exists"], false);

        app.fixture.write_ai_file(
            "site",
            "foo",
            "Volume 1",
            "1",
            &json!({ "body": "<p>AI.</p>", "isAIGenerated": true }),
        );
        assert_eq!(get_json(&app, uri).await.1["exists"], true);
    }

    #[tokio::test]
    async fn regenerate_returns_new_record_and_prefetches_next() {
        let mut app = test_app(true, ScriptedRewriter::answering("Hello world, rewritten."));

        let (status, payload) = post_json(
            &app,
            "/api/novels/foo/chapters/Volume%201/1/regenerate",
            json!({}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["success"], true);
        assert_eq!(payload["data"]["body"], "<p>Hello world, rewritten.</p>");
        assert_eq!(payload["data"]["isAIGenerated"], true);
        assert!(app.fixture.ai_file("site", "foo", "Volume 1", "1").exists());
        assert_eq!(
            app.jobs.try_recv().unwrap(),
            PreloadJob::NextAfter(ChapterKey::new("foo", "Volume 1", "1"))
        );
    }

    #[tokio::test]
    async fn regenerate_surfaces_refusal_and_provider_errors() {
        let app = test_app(
            true,
            ScriptedRewriter::new(vec![
                Ok("I don't have enough information to answer."),
                Err("connection refused"),
            ]),
        );
        let uri = "/api/novels/foo/chapters/Volume%201/1/regenerate";

        let (status, _) = post_json(&app, uri, json!({})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = post_json(&app, uri, json!({})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!app.fixture.ai_file("site", "foo", "Volume 1", "1").exists());
    }

    #[tokio::test]
    async fn bulk_generate_is_accepted_and_trackable() {
        let mut app = test_app(true, ScriptedRewriter::default());

        let (status, accepted) =
            post_json(&app, "/api/novels/foo/bulk-generate?startChapter=1&endChapter=2", json!({})).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let job_id = accepted["jobId"].as_str().unwrap().to_string();
        let (status, job) = get_json(&app, &format!("/api/jobs/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "queued");

        match app.jobs.try_recv().unwrap() {
            PreloadJob::Bulk { novel_id, start, end, .. } => {
                assert_eq!(novel_id, "foo");
                assert_eq!(start.as_deref(), Some("1"));
                assert_eq!(end.as_deref(), Some("2"));
            }
            other => panic!("unexpected job {:?}", other),
        }

        let (status, _) = post_json(&app, "/api/novels/nope/bulk-generate", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(&app, &format!("/api/jobs/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json(&app, "/api/jobs/not-a-uuid").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn settings_round_trip_keeps_prompt_when_omitted() {
        let app = test_app(false, ScriptedRewriter::default());

        let (status, saved) = post_json(
            &app,
            "/api/settings/ai-rewrite",
            json!({ "enabled": true, "prompt": "Rewrite in a lyrical voice." }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["enabled"], true);

        let (_, toggled) = post_json(&app, "/api/settings/ai-rewrite", json!({ "enabled": false })).await;
        assert_eq!(toggled["prompt"], "Rewrite in a lyrical voice.");

        let (_, current) = get_json(&app, "/api/settings/ai-rewrite").await;
        assert_eq!(current, json!({ "enabled": false, "prompt": "Rewrite in a lyrical voice." }));
    }

    #[tokio::test]
    async fn glossary_defaults_to_empty() {
        let app = test_app(false, ScriptedRewriter::default());

        let (status, glossary) = get_json(&app, "/api/novels/foo/glossary").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(glossary, json!({ "terms": [], "lastUpdated": null }));
    }

    #[tokio::test]
    async fn ask_requires_a_question() {
        let app = test_app(false, ScriptedRewriter::answering("The sect that raised him."));

        let (status, _) = post_json(&app, "/api/ai/ask", json!({ "question": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, payload) = post_json(&app, "/api/ai/ask", json!({ "question": "Azure Sect" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["answer"], "The sect that raised him.");
    }

    #[tokio::test]
    async fn index_links_to_html_chapter_list() {
        let app = test_app(false, ScriptedRewriter::default());
        app.fixture.chapter("site", "foo", "Volume 2", "3", "<p>Later.</p>");

        let (_, response) = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let index = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(index.contains(r#"href="/novels/foo""#));

        let (status, response) = send(&app, Request::get("/novels/foo").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(html.contains("<h1>Foo &amp; Bar</h1>"));
        let first = html.find("<h2>Volume 1</h2>").unwrap();
        let second = html.find("<h2>Volume 2</h2>").unwrap();
        assert!(first < second);
        assert!(html.contains(r#"href="/api/novels/foo/chapters/Volume%201/2""#));
        assert!(html.contains(r#"href="/api/novels/foo/chapters/Volume%202/3""#));

        let (status, _) = send(&app, Request::get("/novels/nope").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn all_chapters_returns_stored_records() {
        let app = test_app(false, ScriptedRewriter::default());

        let (status, entries) = get_json(&app, "/api/novels/foo/all-chapters").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(entries.as_array().unwrap().len(), 2);
        assert_eq!(entries[0]["volume"], "Volume 1");
        assert_eq!(entries[0]["chapter"], "1");
        assert_eq!(entries[0]["title"], "Chapter 1");
        assert_eq!(entries[0]["body"], "<p>Chapter 1</p><p>Hello world.</p>");
        assert_eq!(entries[1]["url"], "https://example.org/foo/2");

        let (status, _) = get_json(&app, "/api/novels/nope/all-chapters").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rewrite_endpoint_returns_text() {
        let app = test_app(
            false,
            ScriptedRewriter::new(vec![Ok("Short and clear."), Err("provider offline")]),
        );

        let (status, _) = post_json(&app, "/api/rewrite", json!({ "style": "concise" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, payload) = post_json(
            &app,
            "/api/rewrite",
            json!({ "text": "A long and winding sentence.", "style": "simplified" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload, json!({ "text": "Short and clear." }));

        let (status, _) = post_json(&app, "/api/rewrite", json!({ "text": "Again." })).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
