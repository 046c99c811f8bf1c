//! Content types and extension lookup for static files.

/// Content types the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    TextPlain,
    TextHtml,
    TextCss,
    TextXml,
    TextXsl,
    ApplicationJson,
    ApplicationXml,
    ApplicationJavascript,
    ApplicationOctetStream,
    ImageSvgXml,
    FontTrueType,
    FontOpenType,
    FontWoff,
    FontWoff2,
    FontEmbeddedOpenType,
    ImagePng,
    ImageJpeg,
    ImageGif,
    ImageBmp,
    ImageIcon,
    ImageIcns,
}

const EXTENSIONS: &[(&str, ContentType)] = &[
    ("html", ContentType::TextHtml),
    ("js", ContentType::ApplicationJavascript),
    ("css", ContentType::TextCss),
    ("xml", ContentType::TextXml),
    ("xsl", ContentType::TextXsl),
    ("txt", ContentType::TextPlain),
    ("svg", ContentType::ImageSvgXml),
    ("ttf", ContentType::FontTrueType),
    ("otf", ContentType::FontOpenType),
    ("woff2", ContentType::FontWoff2),
    ("woff", ContentType::FontWoff),
    ("eot", ContentType::FontEmbeddedOpenType),
    ("png", ContentType::ImagePng),
    ("jpg", ContentType::ImageJpeg),
    ("jpeg", ContentType::ImageJpeg),
    ("gif", ContentType::ImageGif),
    ("bmp", ContentType::ImageBmp),
    ("ico", ContentType::ImageIcon),
    ("icns", ContentType::ImageIcns),
];

impl ContentType {
    /// Value of the `Content-Type` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::TextPlain => "text/plain; charset=utf-8",
            ContentType::TextHtml => "text/html; charset=utf-8",
            ContentType::TextCss => "text/css; charset=utf-8",
            ContentType::TextXml => "text/xml; charset=utf-8",
            ContentType::TextXsl => "text/xsl; charset=utf-8",
            ContentType::ApplicationJson => "application/json; charset=utf-8",
            ContentType::ApplicationXml => "application/xml; charset=utf-8",
            ContentType::ApplicationJavascript => "application/x-javascript; charset=utf-8",
            ContentType::ApplicationOctetStream => "application/octet-stream",
            ContentType::ImageSvgXml => "image/svg+xml",
            ContentType::FontTrueType => "application/x-font-truetype",
            ContentType::FontOpenType => "application/x-font-opentype",
            ContentType::FontWoff => "application/font-woff",
            ContentType::FontWoff2 => "application/font-woff2",
            ContentType::FontEmbeddedOpenType => "application/vnd.ms-fontobject",
            ContentType::ImagePng => "image/png",
            ContentType::ImageJpeg => "image/jpeg",
            ContentType::ImageGif => "image/gif",
            ContentType::ImageBmp => "image/bmp",
            ContentType::ImageIcon => "image/x-icon",
            ContentType::ImageIcns => "image/icns",
        }
    }

    /// Content type for a file name, by its last extension.
    ///
    /// Names without an extension (or ending in a dot) map to
    /// `application/octet-stream`.
    ///
    /// ```
    /// # use lantern::http::mime::ContentType;
    /// assert_eq!(ContentType::for_filename("dashboard.js"), ContentType::ApplicationJavascript);
    /// assert_eq!(ContentType::for_filename("README"), ContentType::ApplicationOctetStream);
    /// ```
    pub fn for_filename(filename: &str) -> Self {
        let ext = match filename.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() && !ext.contains('/') => ext,
            _ => return ContentType::ApplicationOctetStream,
        };

        EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, ct)| *ct)
            .unwrap_or(ContentType::ApplicationOctetStream)
    }
}
