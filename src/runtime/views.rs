//! Static menus, pickers and canned texts

use crate::callback::{Callback, ADMIN_LABEL, HELP_LABEL, PROFILE_LABEL, START_LABEL};
use crate::db::{Lesson, LessonId, Question};
use crate::state_machine::{EditAction, QuestionPurpose};
use crate::transport::{Button, Markup, Reply};

pub const NO_LESSONS: &str = "No lessons have been added yet.";
pub const NAVIGATION_HINT: &str = "Use the menu buttons or commands to navigate.";
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";
pub const ACCESS_DENIED: &str = "❌ You do not have access to the admin menu.";

fn back_to_menu() -> Button {
    Button::new("◀️ Back to menu", &Callback::AdminMenu)
}

fn cancel() -> Button {
    Button::new("❌ Cancel", &Callback::EditCancel)
}

/// Persistent keyboard shown to every user
pub fn main_menu(admin: bool) -> Markup {
    Markup::MainMenu { admin }
}

/// Learner lesson picker
pub fn lesson_list(lessons: &[Lesson]) -> Reply {
    Reply::text("📚 Choose a lesson:").with_markup(Markup::column(
        lessons
            .iter()
            .map(|l| Button::new(l.title.clone(), &Callback::Lesson(l.id))),
    ))
}

/// Admin lesson list; every button maps the lesson id through `action`
pub fn admin_lesson_list(
    header: &str,
    lessons: &[Lesson],
    action: impl Fn(LessonId) -> Callback,
) -> Reply {
    let buttons = lessons
        .iter()
        .map(|l| Button::new(l.title.clone(), &action(l.id)))
        .chain(std::iter::once(back_to_menu()));
    Reply::text(header).with_markup(Markup::column(buttons))
}

pub fn navigation() -> Reply {
    Reply::text("What next?").with_markup(Markup::column([
        Button::new("➡️ Next lesson", &Callback::NextLesson),
        Button::new("📚 Choose a lesson", &Callback::ChooseLesson),
    ]))
}

pub fn admin_menu() -> Reply {
    Reply::text("🔧 Admin menu\n\nChoose an action:").with_markup(Markup::column([
        Button::new("➕ Create lesson", &Callback::AdminCreateLesson),
        Button::new("✏️ Edit lesson", &Callback::AdminEditLesson),
        Button::new("🗑️ Delete lesson", &Callback::AdminDeleteLesson),
        Button::new("📚 List lessons", &Callback::AdminListLessons),
    ]))
}

pub fn action_menu(lesson: &Lesson) -> Reply {
    let buttons = EditAction::ALL
        .into_iter()
        .map(|a| Button::new(a.label(), &Callback::EditAction(a, lesson.id)))
        .chain(std::iter::once(cancel()));
    Reply::text(format!("✏️ {}\n\nChoose what to change:", lesson.title))
        .with_markup(Markup::column(buttons))
}

pub fn question_picker(questions: &[Question], purpose: QuestionPurpose) -> Reply {
    let buttons = questions
        .iter()
        .enumerate()
        .map(|(idx, q)| {
            let callback = match purpose {
                QuestionPurpose::Answers => Callback::EditQuestionAnswers(q.id),
                QuestionPurpose::Correct => Callback::EditQuestionCorrect(q.id),
            };
            Button::new(format!("Question {}", idx + 1), &callback)
        })
        .chain(std::iter::once(cancel()));
    Reply::text("Choose a question:").with_markup(Markup::column(buttons))
}

/// Answers numbered from 1 with the current correct one marked
pub fn correct_picker(question: &Question) -> Reply {
    let mut text = format!("Question:\n{}\n\nAnswers:\n\n", question.text);
    let mut current = None;
    for (idx, answer) in question.answers.iter().enumerate() {
        let marker = if answer.is_correct {
            current = Some(idx + 1);
            "✅ "
        } else {
            ""
        };
        text.push_str(&format!("{marker}{}. {}\n", idx + 1, answer.text));
    }
    match current {
        Some(position) => text.push_str(&format!("\nCurrent correct answer: {position}")),
        None => text.push_str("\nNo correct answer is set"),
    }
    text.push_str("\n\nChoose the new correct answer:");

    let buttons = question
        .answers
        .iter()
        .enumerate()
        .map(|(idx, answer)| {
            let label = if answer.is_correct {
                format!("{}. {} ✅", idx + 1, answer.text)
            } else {
                format!("{}. {}", idx + 1, answer.text)
            };
            Button::new(
                label,
                &Callback::EditCorrect {
                    question_id: question.id,
                    position: idx + 1,
                },
            )
        })
        .chain(std::iter::once(cancel()));
    Reply::text(text).with_markup(Markup::column(buttons))
}

pub fn delete_confirmation(lesson: &Lesson) -> Reply {
    Reply::text(format!(
        "⚠️ WARNING!\n\nYou are about to delete the lesson:\n📝 {}\n\n\
         This cannot be undone!\n\nAre you sure?",
        lesson.title
    ))
    .with_markup(Markup::inline(vec![vec![
        Button::new("✅ Yes, delete", &Callback::ConfirmDelete(lesson.id)),
        Button::new("❌ Cancel", &Callback::CancelDelete(lesson.id)),
    ]]))
}

pub fn help(admin: bool) -> Reply {
    let mut text = format!(
        "📖 Help\n\nAvailable commands:\n\
         {START_LABEL} - go through the lessons\n\
         {PROFILE_LABEL} - see your progress\n\
         {HELP_LABEL} - show this message\n"
    );
    if admin {
        text.push_str(&format!(
            "\n🔧 Admin commands:\n{ADMIN_LABEL} - open the admin panel\n"
        ));
    }
    Reply::text(text).with_markup(main_menu(admin))
}

pub fn profile(current: Option<&Lesson>, admin: bool) -> Reply {
    let text = match current {
        Some(lesson) => format!(
            "📊 Your profile\n\nCurrent lesson: {}\n\nKeep learning!",
            lesson.title
        ),
        None => format!(
            "📊 Your profile\n\nYou have not started any lessons yet.\n\
             Press «{START_LABEL}» to begin!"
        ),
    };
    Reply::text(text).with_markup(main_menu(admin))
}
