mod config;
mod conversation;
mod error;
mod gemini;
mod history;
mod recent;
mod render;
mod theme;

use iced::{
    widget::{
        button, column, container, pick_list, row, scrollable, text, text_editor, Space,
    },
    Element, Length, Task, Theme, Font, Subscription, Color,
    time, clipboard,
    keyboard::{self, Key},
    event::{self, Event as IcedEvent},
    alignment, Padding,
    window,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use conversation::{Conversation, Turn};
use error::ChatError;
use gemini::GeminiClient;
use history::HistoryStore;
use render::Palette;
use theme::ThemeChoice;

const LOG_ENV: &str = "FLUX_AI_LOG";
const TRANSCRIPT_ID: &str = "transcript";
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store() -> HistoryStore {
    let path = history::db_path();
    match HistoryStore::open(&path) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("history unavailable ({:#}); keeping it in memory for this session", e);
            HistoryStore::open_in_memory().expect("Failed to create in-memory history store")
        }
    }
}

fn main() -> iced::Result {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = config::Config::load();
    let size = iced::Size::new(config.window.width as f32, config.window.height as f32);
    let min_size = iced::Size::new(config.window.min_width as f32, config.window.min_height as f32);

    iced::application("Flux AI", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size,
            min_size: Some(min_size),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(move || App::new(config))
}

#[derive(Debug, Clone)]
enum Message {
    InputAction(text_editor::Action),
    Submit,
    HistorySelected(String),
    AnswerReceived(Result<String, ChatError>),
    ThemeSelected(ThemeChoice),
    ClearChat,
    ClearHistory,
    CopyAnswer,
    Tick,
    Exit,
}

/// Enter submits; Shift+Enter falls through to the editor and inserts a newline.
fn input_binding(key_press: text_editor::KeyPress) -> Option<text_editor::Binding<Message>> {
    match key_press.key.as_ref() {
        Key::Named(keyboard::key::Named::Enter) if !key_press.modifiers.shift() => {
            Some(text_editor::Binding::Custom(Message::Submit))
        }
        _ => text_editor::Binding::from_key_press(key_press),
    }
}

struct App {
    conversation: Conversation,
    client: Arc<GeminiClient>,
    input: text_editor::Content,
    theme: ThemeChoice,
    loading_frame: usize,
}

impl App {
    fn new(config: config::Config) -> (Self, Task<Message>) {
        let client = GeminiClient::with_config(&config.gemini);
        tracing::info!(endpoint = client.endpoint(), "using generateContent endpoint");

        let app = App {
            conversation: Conversation::new(open_store()),
            client: Arc::new(client),
            input: text_editor::Content::new(),
            theme: config.ui.theme,
            loading_frame: 0,
        };

        (app, Task::none())
    }

    fn request(&self, question: String) -> Task<Message> {
        let client = self.client.clone();
        Task::perform(
            async move { client.generate(&question).await },
            Message::AnswerReceived,
        )
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputAction(action) => {
                self.input.perform(action);
                Task::none()
            }
            Message::Submit => {
                let typed = self.input.text();
                match self.conversation.submit(&typed) {
                    Some(question) => {
                        self.loading_frame = 0;
                        self.request(question)
                    }
                    None => Task::none(),
                }
            }
            Message::HistorySelected(entry) => match self.conversation.select_history(&entry) {
                Some(question) => {
                    self.loading_frame = 0;
                    self.request(question)
                }
                None => Task::none(),
            },
            Message::AnswerReceived(result) => {
                if self.conversation.complete(result) {
                    self.input = text_editor::Content::new();
                    scrollable::snap_to(
                        scrollable::Id::new(TRANSCRIPT_ID),
                        scrollable::RelativeOffset::END,
                    )
                } else {
                    Task::none()
                }
            }
            Message::ThemeSelected(choice) => {
                self.theme = choice;
                Task::none()
            }
            Message::ClearChat => {
                self.conversation.clear_chat();
                Task::none()
            }
            Message::ClearHistory => {
                self.conversation.clear_history();
                Task::none()
            }
            Message::CopyAnswer => match self.conversation.last_answer() {
                Some(answer) => clipboard::write(answer.plain_text()),
                None => Task::none(),
            },
            Message::Tick => {
                if self.conversation.is_submitting() {
                    self.loading_frame = (self.loading_frame + 1) % SPINNER_FRAMES.len();
                }
                Task::none()
            }
            Message::Exit => iced::exit(),
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.conversation.is_submitting() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Exit)
            } else {
                None
            }
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<'_, Message> {
        row![self.sidebar(), self.main_area()]
            .height(Length::Fill)
            .into()
    }

    fn sidebar(&self) -> Element<'_, Message> {
        let palette = Palette::for_dark(self.theme.is_dark());

        let title = column![
            text("Flux AI").size(16).font(Font {
                weight: iced::font::Weight::Bold,
                ..Font::MONOSPACE
            }),
            text("Ask about code, debugging, or learning concepts.")
                .size(11)
                .color(palette.muted),
        ]
        .spacing(4);

        let recent_header = row![
            column![
                text("RECENT").size(12),
                text("Click any query to reuse it").size(11).color(palette.muted),
            ]
            .spacing(2),
            Space::with_width(Length::Fill),
            button(text("Clear").size(11))
                .on_press(Message::ClearHistory)
                .style(button::secondary)
                .padding([4, 10]),
        ]
        .align_y(alignment::Vertical::Center);

        let theme_picker = column![
            text("THEME").size(10).color(palette.muted),
            pick_list(ThemeChoice::ALL, Some(self.theme), Message::ThemeSelected)
                .text_size(12)
                .width(Length::Fixed(130.0)),
        ]
        .spacing(4);

        container(
            column![
                title,
                recent_header,
                recent::view(self.conversation.history(), self.conversation.is_submitting()),
                theme_picker,
            ]
            .spacing(16)
            .padding(16)
            .height(Length::Fill),
        )
        .width(Length::Fixed(280.0))
        .height(Length::Fill)
        .into()
    }

    fn main_area(&self) -> Element<'_, Message> {
        let palette = Palette::for_dark(self.theme.is_dark());
        let busy = self.conversation.is_submitting();

        let mut header = column![row![
            column![
                text("Hey, what are we building today?").size(24),
                text("Explain concepts, generate code, or ask for step-by-step help.")
                    .size(13)
                    .color(palette.muted),
            ]
            .spacing(6),
            Space::with_width(Length::Fill),
            button(text("Clear chat").size(12))
                .on_press(Message::ClearChat)
                .style(button::secondary)
                .padding([6, 14]),
        ]
        .align_y(alignment::Vertical::Center)]
        .spacing(10);

        if let Some(error) = self.conversation.error() {
            header = header.push(
                container(text(error).size(13).color(Color::from_rgb8(0xF4, 0x3F, 0x5E)))
                    .padding([8, 12])
                    .width(Length::Fill)
                    .style(container::rounded_box),
            );
        }

        let mut content = column![header].spacing(12);

        if busy {
            content = content.push(
                container(
                    row![
                        text(SPINNER_FRAMES[self.loading_frame]).size(16),
                        text("Thinking…").size(12).color(palette.muted),
                    ]
                    .spacing(8)
                    .align_y(alignment::Vertical::Center),
                )
                .width(Length::Fill)
                .align_x(alignment::Horizontal::Center),
            );
        }

        content = content.push(self.transcript(palette));
        content = content.push(self.input_bar(busy));
        content = content.push(
            container(
                text("Answers may be inaccurate. Review the code before using.")
                    .size(10)
                    .color(palette.muted),
            )
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Center),
        );

        container(content.padding(Padding::from([20, 28])))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn transcript(&self, palette: Palette) -> Element<'_, Message> {
        let turns = self.conversation.turns();

        if turns.is_empty() {
            return container(
                column![
                    text("Start by asking a question below.").size(14),
                    text("For example: “Explain this bug to me”, or “Teach me Java from zero”.")
                        .size(12)
                        .color(palette.muted),
                ]
                .spacing(6)
                .align_x(alignment::Horizontal::Center),
            )
            .width(Length::Fill)
            .height(Length::Fill)
            .align_x(alignment::Horizontal::Center)
            .align_y(alignment::Vertical::Center)
            .style(container::bordered_box)
            .into();
        }

        let items = turns.iter().map(|turn| match turn {
            Turn::Question(question) => container(
                container(text(question.as_str()).size(15))
                    .padding([8, 14])
                    .max_width(620.0)
                    .style(container::rounded_box),
            )
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Right)
            .into(),
            Turn::Answer(answer) => column(
                answer
                    .rendered
                    .iter()
                    .map(|fragment| render::view(fragment, palette)),
            )
            .spacing(10)
            .width(Length::Fill)
            .into(),
        });

        let mut body = column(items).spacing(18).padding(18);
        if self.conversation.last_answer().is_some() && !self.conversation.is_submitting() {
            body = body.push(
                container(
                    button(text("[Copy]").size(12))
                        .on_press(Message::CopyAnswer)
                        .style(button::text),
                )
                .width(Length::Fill)
                .align_x(alignment::Horizontal::Right),
            );
        }

        container(
            scrollable(body)
                .id(scrollable::Id::new(TRANSCRIPT_ID))
                .height(Length::Fill),
        )
        .height(Length::Fill)
        .style(container::bordered_box)
        .into()
    }

    fn input_bar(&self, busy: bool) -> Element<'_, Message> {
        let typed = self.input.text();
        let can_submit = self.conversation.can_submit(&typed);

        let editor = text_editor(&self.input)
            .placeholder("Ask me anything about code, errors, or concepts...")
            .on_action(Message::InputAction)
            .key_binding(input_binding)
            .height(Length::Shrink)
            .padding(12)
            .size(15);

        let ask = button(text(if busy { "…" } else { "Ask" }).size(14))
            .on_press_maybe(can_submit.then_some(Message::Submit))
            .style(button::primary)
            .padding([10, 18]);

        let bar = row![editor, ask]
            .spacing(12)
            .align_y(alignment::Vertical::Center);

        match self.conversation.selected() {
            Some(entry) if busy => column![
                text(format!("Replaying: {}", recent::truncate_entry(entry, 60)))
                    .size(11)
                    .color(Palette::for_dark(self.theme.is_dark()).muted),
                bar,
            ]
            .spacing(6)
            .into(),
            _ => bar.into(),
        }
    }

    fn theme(&self) -> Theme {
        self.theme.theme()
    }
}
