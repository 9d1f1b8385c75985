//! Prompt construction and the plain lecture listing used as a fallback.

use chrono::{DateTime, Local};

use crate::clock::{arabic_long_date, arabic_weekday};
use crate::models::Lecture;

/// Lectures summarized in the prompt.
pub const PROMPT_LECTURES: usize = 8;

/// Lectures shown in the fallback listing.
pub const LISTING_LECTURES: usize = 5;

const UNTITLED: &str = "بدون عنوان";
const UNSPECIFIED: &str = "غير محدد";

/// Build the prompt for one question.
///
/// `total_lectures` is the size of the cached timetable, mentioned when no
/// lecture matched so the model can say the data exists.
pub fn build_prompt(
    question: &str,
    matched: &[Lecture],
    total_lectures: usize,
    now: &DateTime<Local>,
) -> String {
    let today = arabic_weekday(now);
    let mut context = format!(
        "\n\nمعلومة مهمة: اليوم هو {} ({})\n",
        today,
        arabic_long_date(now)
    );

    if !matched.is_empty() {
        context.push_str("\nالمحاضرات المتاحة:\n");
        for (idx, lecture) in matched.iter().take(PROMPT_LECTURES).enumerate() {
            context.push_str(&format!(
                "{}. {} | {} {} | {} | {}\n",
                idx + 1,
                or_default(&lecture.lecture_title, UNTITLED),
                lecture.day,
                lecture.lecture_time,
                lecture.instructor,
                lecture.room
            ));
        }
    } else if total_lectures > 0 {
        context.push_str(&format!(
            "\nيوجد {} محاضرة في قاعدة البيانات.",
            total_lectures
        ));
    } else {
        context.push_str("\nقاعدة البيانات فارغة.");
    }

    format!(
        "أنت مساعد ذكي في الكلية. ساعد الطلاب في الإجابة على استفساراتهم حول المحاضرات.

{context}

تعليمات مهمة:
- اليوم الحالي هو {today} - استخدم هذه المعلومة عند الإجابة على أسئلة عن \"اليوم\" أو \"هذا اليوم\"
- كن ودوداً ومهذباً
- استخدم emojis (📚 📅 🎓 💡 ✨ 📍 ⏰ 👨‍🏫)
- استخدم ** للعناوين و - للقوائم
- قدم المعلومات بشكل منظم
- إذا سأل الطالب عن محاضرات \"اليوم\" أو \"هذا اليوم\"، ابحث عن المحاضرات في يوم {today}
- كن مختصراً وواضحاً

السؤال: {question}

أجب بالعربية:"
    )
}

/// Heading of the fallback listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingHeading<'a> {
    /// "Lectures available today (<weekday>)".
    Today(&'a str),
    General,
}

/// Render matched lectures as a fixed Markdown listing.
///
/// Output depends only on the inputs.
pub fn render_listing(lectures: &[Lecture], heading: ListingHeading<'_>) -> String {
    let mut out = String::from("مرحباً! 👋\n\n");
    match heading {
        ListingHeading::Today(day) => {
            out.push_str(&format!("**المحاضرات المتاحة لليوم ({}):**\n\n", day));
        }
        ListingHeading::General => out.push_str("**المحاضرات المتاحة:**\n\n"),
    }

    for (idx, lecture) in lectures.iter().take(LISTING_LECTURES).enumerate() {
        out.push_str(&format!(
            "{}. **{}** 📚\n",
            idx + 1,
            or_default(&lecture.lecture_title, UNTITLED)
        ));
        out.push_str(&format!(
            "   - 📅 اليوم: {}\n",
            or_default(&lecture.day, UNSPECIFIED)
        ));
        out.push_str(&format!(
            "   - ⏰ الوقت: {}\n",
            or_default(&lecture.lecture_time, UNSPECIFIED)
        ));
        out.push_str(&format!(
            "   - 👨‍🏫 الدكتور: {}\n",
            or_default(&lecture.instructor, UNSPECIFIED)
        ));
        out.push_str(&format!(
            "   - 📍 القاعة: {}\n",
            or_default(&lecture.room, UNSPECIFIED)
        ));
        if !lecture.department.trim().is_empty() {
            out.push_str(&format!("   - 🏫 القسم: {}\n", lecture.department));
        }
        if !lecture.level.trim().is_empty() {
            out.push_str(&format!("   - 🎓 المستوى: {}\n", lecture.level));
        }
        out.push('\n');
    }

    out
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
